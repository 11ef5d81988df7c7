//! Browser command-line construction
//!
//! The argument list is a pure function of the browser configuration and the
//! target URL. Flags target a fully local, single-purpose display on
//! constrained hardware and are not suitable for general browsing.

use crate::config::BrowserConfig;
use crate::traits::LaunchSpec;

/// Lower bound for the script heap cap, in MB
const MIN_SCRIPT_HEAP_MB: u32 = 16;

/// Build the browser argument list; `url` is always the final positional argument
pub fn build_browser_args(config: &BrowserConfig, url: &str) -> Vec<String> {
    let mut args = vec![
        // Kiosk presentation
        "--kiosk".to_string(),
        "--start-fullscreen".to_string(),
        "--noerrdialogs".to_string(),
        "--disable-infobars".to_string(),
        "--no-first-run".to_string(),
        "--disable-session-crashed-bubble".to_string(),
        "--disable-translate".to_string(),
        "--disable-features=TranslateUI".to_string(),
        format!("--window-size={},{}", config.window_width, config.window_height),
        "--window-position=0,0".to_string(),
        format!("--force-device-scale-factor={}", config.device_scale_factor),
        // Local single-purpose content only
        "--disable-web-security".to_string(),
        "--allow-running-insecure-content".to_string(),
        "--no-default-browser-check".to_string(),
        // Memory constraints
        "--disable-dev-shm-usage".to_string(),
        format!("--js-flags=--max-old-space-size={}", script_heap_mb(config)),
        "--renderer-process-limit=1".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-sync".to_string(),
        "--disable-component-update".to_string(),
    ];

    if config.disable_extensions {
        args.push("--disable-extensions".to_string());
    }
    if config.disable_plugins {
        args.push("--disable-plugins".to_string());
    }
    if config.disable_gpu {
        args.push("--disable-gpu".to_string());
        args.push("--disable-software-rasterizer".to_string());
    }
    if config.hide_scrollbars {
        args.push("--hide-scrollbars".to_string());
    }
    if config.enable_touch {
        args.push("--touch-events=enabled".to_string());
        args.push("--enable-pinch".to_string());
    }
    if let Some(dir) = &config.user_data_dir {
        args.push(format!("--user-data-dir={}", dir.display()));
    }

    args.push(url.to_string());
    args
}

/// Script heap cap: half the process memory limit, never below the floor
fn script_heap_mb(config: &BrowserConfig) -> u32 {
    (config.memory_limit_mb / 2).max(MIN_SCRIPT_HEAP_MB)
}

/// Full launch spec for the browser: program, flags, display and working directory
pub fn browser_launch_spec(config: &BrowserConfig, url: &str) -> LaunchSpec {
    let env = config
        .display
        .iter()
        .map(|display| ("DISPLAY".to_string(), display.clone()))
        .collect();

    LaunchSpec {
        program: config.executable.clone(),
        args: build_browser_args(config, url),
        env,
        working_dir: config.working_dir.clone(),
        forward_output: config.forward_output,
    }
}
