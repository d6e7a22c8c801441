#[tokio::main]
async fn main() -> anyhow::Result<()> {
    documate_gateway::run().await
}
