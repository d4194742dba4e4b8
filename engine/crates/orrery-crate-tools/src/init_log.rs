use std::io::Write;

/// 日志配置
///
/// - `default_level`: 没有设置 `RUST_LOG` 时使用的等级
/// - `filters`: 额外的 env_logger filter，例如 `"orrery_gfx=debug"`
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub default_level: log::LevelFilter,
    pub filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: log::LevelFilter::Info,
            filters: None,
        }
    }
}

/// 使用默认配置初始化日志
pub fn init_log() {
    init_log_with(LogConfig::default());
}

/// 初始化全局 logger
///
/// 可以重复调用，只有第一次生效（测试中多个 case 都会调用）
pub fn init_log_with(config: LogConfig) {
    let mut builder = env_logger::Builder::new();
    builder.format(|buf, record| {
        let info_style = buf
            .default_level_style(log::Level::Info)
            .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
        let warn_style = buf
            .default_level_style(log::Level::Warn)
            .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
        let error_style = buf
            .default_level_style(log::Level::Error)
            .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

        let level_style = match record.level() {
            log::Level::Info => info_style,
            log::Level::Warn => warn_style,
            log::Level::Error => error_style,
            _ => buf.default_level_style(record.level()),
        };
        let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

        let line = record.line().unwrap_or(!0);
        let file = record.file().unwrap_or("").rsplit(['/', '\\']).next().unwrap_or("");
        let time = chrono::Local::now().format("%H:%M:%S%.3f");
        let level = record.level();

        writeln!(
            buf,
            "{level_style}[{time}] {level}{level_style:#} {grey_style}[{file}:{line}]{grey_style:#} {}",
            record.args()
        )
    });

    builder.filter_level(config.default_level);
    if let Ok(env_filter) = std::env::var("RUST_LOG") {
        builder.parse_filters(&env_filter);
    }
    if let Some(filters) = &config.filters {
        builder.parse_filters(filters);
    }

    if builder.try_init().is_ok() {
        log::debug!("logger initialized, default level: {}", config.default_level);
    }
}
