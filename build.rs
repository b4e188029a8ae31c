//! Populates the compile-time env vars `build_info::get()` reads, so
//! `goup version --json` reports real build identity instead of the
//! `option_env!` fallbacks.

fn command_stdout(cmd: &str, args: &[&str]) -> Option<String> {
    let output = std::process::Command::new(cmd).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn main() {
    let commit = command_stdout("git", &["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=GOUP_BUILD_COMMIT={commit}");

    let build_date = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=GOUP_BUILD_DATE={build_date}");

    // Cargo sets `TARGET` for build scripts to the target triple being
    // compiled for; forward it so it's visible to the crate at runtime
    // via `option_env!`.
    if let Ok(target) = std::env::var("TARGET") {
        println!("cargo:rustc-env=TARGET={target}");
    }

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
