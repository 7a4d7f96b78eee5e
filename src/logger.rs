//! 日志管理模块
use crate::config::LoggingConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing_subscriber::EnvFilter;

/// 初始化全局 tracing 订阅者
///
/// `RUST_LOG` 已在配置加载阶段合并进 `logging.level`。
pub fn init(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|e| {
        eprintln!("无效的日志级别 `{}`: {}，使用 info", logging.level, e);
        EnvFilter::new("info")
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing 订阅者已初始化: {}", e);
    }
}

/// 日志脱敏规则
static SANITIZE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    let patterns = [
        // Bearer token
        (r"Bearer\s+[A-Za-z0-9._%-]+", "Bearer ***"),
        // 通用 token
        (r#"token["']?\s*[:=]\s*["']?[A-Za-z0-9._%-]+"#, "token: ***"),
        // authorization header
        (
            r#"[Aa]uthorization["']?\s*[:=]\s*["']?[A-Za-z0-9._%\s-]+"#,
            "authorization: ***",
        ),
        // checksum 可用于关联设备，同样脱敏
        (
            r#"checksum["']?\s*[:=]\s*["']?[A-Za-z0-9/._-]+"#,
            "checksum: ***",
        ),
    ];

    patterns
        .into_iter()
        .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
            Ok(re) => Some((re, replacement)),
            Err(e) => {
                eprintln!("无效的脱敏规则 `{}`: {}", pattern, e);
                None
            }
        })
        .collect()
});

/// 日志脱敏
pub fn sanitize_log_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for (re, replacement) in SANITIZE_PATTERNS.iter() {
        sanitized = re.replace_all(&sanitized, *replacement).to_string();
    }
    sanitized
}

/// 只保留 token 首尾各 4 个字符，用于日志中区分不同调用方
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}***{}", head, tail)
}
