use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");

    let version = env!("CARGO_PKG_VERSION");
    let long_version = match git_hash() {
        Some(hash) => format!("{version} ({hash})"),
        None => version.to_owned(),
    };

    println!("cargo:rustc-env=NETSPEED_VERSION={long_version}");
}

/// Short commit hash of the checkout. Builds outside one simply go without.
fn git_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=10", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let hash = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    (!hash.is_empty()).then_some(hash)
}
