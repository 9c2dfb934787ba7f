#[tokio::main]
async fn main() -> anyhow::Result<()> {
    financial_dashboard_lib::run().await?;
    Ok(())
}
