//! Build script for agora
//!
//! Captures git commit hash at build time for version verification.

use std::process::Command;

fn git_output(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

fn main() {
    let short = git_output(&["rev-parse", "--short", "HEAD"]);
    let full = git_output(&["rev-parse", "HEAD"]);

    println!(
        "cargo:rustc-env=GIT_COMMIT_SHORT={}",
        short.as_deref().unwrap_or("unknown")
    );
    println!(
        "cargo:rustc-env=GIT_COMMIT_FULL={}",
        full.as_deref().unwrap_or("unknown")
    );

    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", timestamp);

    // Rebuild if git HEAD changes
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");
}
