#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bubblener_lib::run().await
}
