//! Launcher: reads a JSON sandbox spec and runs it to completion.
//!
//! Exit code 0 means the sandbox ran and was reaped (its own outcome is in
//! the printed report); 1 means the launcher or the bring-up failed.

fn main() {
    if let Err(e) = run() {
        eprintln!("euclid: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(target_os = "linux")]
fn run() -> anyhow::Result<()> {
    use anyhow::Context;

    euclid::observability::init_observability()
        .map_err(|e| anyhow::anyhow!("initializing logging: {e}"))?;

    let path = std::env::args()
        .nth(1)
        .context("usage: euclid <spec.json>")?;
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let spec: euclid::SandboxSpec =
        serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;

    let report = euclid::supervisor::run(spec)?;
    println!("{report}");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn run() -> anyhow::Result<()> {
    anyhow::bail!("euclid requires a Linux kernel with cgroup v2, overlayfs, and seccomp");
}
