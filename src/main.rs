#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    localchat_lib::run().await
}
