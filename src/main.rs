use anyhow::Context;
use cursor_bridge::config::Config;
use cursor_bridge::{logger, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("加载配置失败")?;
    logger::init(&config.logging);

    tracing::info!(
        "[MAIN] cursor-bridge v{} 启动, upstream={}",
        env!("CARGO_PKG_VERSION"),
        config.upstream.base_url
    );

    server::run(config).await
}
