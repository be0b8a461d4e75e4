#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hms_lib::run().await
}
