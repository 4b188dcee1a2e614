pub mod directional;
pub mod mat;
pub mod nn_trait;

pub mod activation;
pub mod head;
pub mod linear;
pub mod network;

pub mod misc;
