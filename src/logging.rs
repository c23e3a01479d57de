//! tracing日志初始化

use tracing_subscriber::EnvFilter;

/// 初始化全局日志订阅者
///
/// 优先使用 `RUST_LOG`；未设置时默认 `kb_agents=info`，`verbose` 下提升为 `debug`。
/// 重复初始化（例如测试中）会被忽略。
pub fn init(verbose: bool) {
    let default_directive = if verbose {
        "kb_agents=debug"
    } else {
        "kb_agents=info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .try_init();
}
