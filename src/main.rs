mod barcode;
mod config;
mod nutrition;
mod ui;
mod workflow;

fn main() {
    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("starting grocery scanner");

    ui::show_ui().expect("could not display ui");
}
