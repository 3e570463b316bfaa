/// Build metadata displayed at startup, primarily useful for matching logs
/// back to a deployed binary.
#[derive(Debug, serde::Serialize)]
pub struct BuildInfo {
    pub cargo_pkg_name: &'static str,
    pub cargo_pkg_version: &'static str,
    pub target_os: &'static str,
    pub target_arch: &'static str,
}

pub const BUILD_INFO: BuildInfo = BuildInfo {
    cargo_pkg_name: env!("CARGO_PKG_NAME"),
    cargo_pkg_version: env!("CARGO_PKG_VERSION"),
    target_os: std::env::consts::OS,
    target_arch: std::env::consts::ARCH,
};
