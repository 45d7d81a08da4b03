/// Application name used for directory and lock naming.
pub const APP_NAME: &str = "fl-build";

/// Directory created under a project to hold state and outputs.
pub const BUILD_DIR_NAME: &str = ".fl-build";

/// Environment variable overriding the build root directory.
pub const BUILD_HOME_ENV: &str = "FLBUILD_HOME";

/// File name of the persisted build state inside a mode directory.
pub const STATE_FILENAME: &str = "state.json";

/// Directory name for toolchain outputs inside a mode directory.
pub const OUT_DIR_NAME: &str = "out";

/// Current on-disk format version of the build state.
pub const STATE_VERSION: u32 = 1;

/// Separator between package and target name in a qualified name.
pub const NAME_SEPARATOR: char = ':';
