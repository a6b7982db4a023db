#[tokio::main]
async fn main() -> anyhow::Result<()> {
    reportagent::run_cli().await
}
