use anyhow::Context;
use secondorder::utils::misc::{
    check_abnormal, classification_targets, regression_targets, uniform, uniform_directions,
};
use secondorder::{LossKind, Network, SecondOrderConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn load_config() -> anyhow::Result<SecondOrderConfig> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {path}"))?
        }
        None => SecondOrderConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = load_config()?;
    info!(?config, "building network");
    let mut network = Network::from_config(&config)?;

    let batch = config.batch_size;
    let input = uniform(batch, config.in_features, config.seed);
    let target = match config.loss {
        LossKind::CrossEntropy => classification_targets(batch, config.out_features, config.seed),
        LossKind::MeanSquaredError => {
            regression_targets(batch, config.out_features, config.seed.wrapping_add(1))
        }
    };

    let pred = network.forward(input)?;
    let loss = network.calc_loss(pred, target)?;
    info!(loss = loss.mean(), "forward");
    network.backward()?;

    let directions = uniform_directions(
        batch,
        network.output_width()?,
        config.num_directions,
        config.seed.wrapping_add(2),
    );
    let projected = network.jac_mat_prod_backward(directions)?;
    info!(shape = ?projected.shape(), finite = projected.is_finite(), "jac_mat_prod");

    let diagonals = network.diag_hessian()?;
    for ((idx, diag), layer) in diagonals.iter().enumerate().zip(network.layers()) {
        check_abnormal(layer.kind().name(), diag);
        info!(
            layer = idx,
            kind = %layer.kind(),
            mean = diag.mean(),
            sum = diag.sum(),
            "diagonal curvature at layer input"
        );
    }
    Ok(())
}
