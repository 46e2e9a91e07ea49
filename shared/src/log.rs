use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{format, time::ChronoLocal},
    EnvFilter,
};

pub fn init_log() {
    let format = format::format()
        .with_level(true) // show level
        .with_target(false) // hide target
        .with_timer(ChronoLocal::new("[%Y-%m-%d %H:%M:%S%.3f]".to_string()))
        .compact();

    let env_filter = EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into());
    tracing_subscriber::fmt().with_env_filter(env_filter).event_format(format).init();
}
