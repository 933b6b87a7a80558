//! Default values for testloom configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// Discovery Defaults
// ============================================================================

/// Directories never scanned for test sources.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    // Version control
    ".git",
    ".svn",
    ".hg",
    // Dependencies
    "node_modules",
    "vendor",
    "bower_components",
    "jspm_packages",
    // Build outputs
    "dist",
    "build",
    "out",
    "target",
    "coverage",
    ".next",
    ".nuxt",
];

// ============================================================================
// Execution Defaults
// ============================================================================

/// Delay before a passed mark is cleared from the tree (5 seconds).
pub const DEFAULT_CLEAR_PASSED_AFTER_MS: u64 = 5_000;

/// File name prefix for temporary structured reports written into a project root.
pub const DEFAULT_REPORT_PREFIX: &str = ".testloom-report";

// ============================================================================
// Jest Defaults
// ============================================================================

/// Glob patterns matching Jest test sources.
pub const DEFAULT_JEST_PATTERNS: &[&str] = &[
    "**/*.test.{js,jsx,ts,tsx,mjs,cjs}",
    "**/*.spec.{js,jsx,ts,tsx,mjs,cjs}",
    "**/__tests__/**/*.{js,jsx,ts,tsx,mjs,cjs}",
];

/// Jest config files whose presence marks a Jest project.
pub const JEST_CONFIG_FILES: &[&str] = &[
    "jest.config.js",
    "jest.config.ts",
    "jest.config.mjs",
    "jest.config.cjs",
    "jest.config.json",
];

// ============================================================================
// PHPUnit Defaults
// ============================================================================

/// Glob patterns matching PHPUnit test sources.
pub const DEFAULT_PHPUNIT_PATTERNS: &[&str] = &["**/*Test.php"];

/// Marker files whose presence marks a PHPUnit project.
pub const PHPUNIT_MARKER_FILES: &[&str] = &["phpunit.xml", "phpunit.xml.dist", "vendor/bin/phpunit"];

/// Composer package name of PHPUnit.
pub const PHPUNIT_PACKAGE: &str = "phpunit/phpunit";

// ============================================================================
// Config file locations
// ============================================================================

/// Project-local configuration file name.
pub const PROJECT_CONFIG_FILE: &str = "testloom.toml";

/// Directory under the user config dir holding `config.toml`.
pub const USER_CONFIG_DIR: &str = "testloom";
