#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vitalis_lib::run().await
}
