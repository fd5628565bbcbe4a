mod adapters;
mod app;
mod control_loop;
mod ports;
mod settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::run().await
}
