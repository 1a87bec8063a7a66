fn main() {
    // Rerun when git HEAD changes (commit, checkout, etc.)
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let output = std::process::Command::new("git")
        .args(["describe", "--always", "--dirty", "--tags"])
        .output();

    // git がない環境（crate 配布物など）ではパッケージのバージョン
    let version = match output {
        Ok(o) if o.status.success() => {
            let described = String::from_utf8_lossy(&o.stdout).trim().to_string();
            format!("{} ({})", env!("CARGO_PKG_VERSION"), described)
        }
        _ => env!("CARGO_PKG_VERSION").to_string(),
    };

    println!("cargo:rustc-env=GIT_VERSION={}", version);
}
