//! Agent identity strings.

pub const NAME: &str = "keywarden";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `User-Agent` value sent with every authority request.
pub fn user_agent() -> String {
    format!(
        "{NAME}/{VERSION} ({}; {})",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
