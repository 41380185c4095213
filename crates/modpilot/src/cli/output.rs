// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! Output mode flags shared by all subcommands.
//!
//! `main` exports the global flags as environment variables so every module
//! can check them without threading arguments through.

pub fn is_json() -> bool {
    std::env::var_os("MODPILOT_JSON").is_some()
}

pub fn is_quiet() -> bool {
    std::env::var_os("MODPILOT_QUIET").is_some()
}

pub fn is_verbose() -> bool {
    std::env::var_os("MODPILOT_VERBOSE").is_some()
}

/// Print a value as pretty JSON on stdout.
pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: failed to encode JSON output: {e}"),
    }
}

pub fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
