// Shared build script utilities for README-to-rustdoc transformation.
// Include this in build.rs files with: include!("../build_common.rs");
//
// Required imports in the including file:
//   use std::env;
//   use std::fs;
//   use std::path::Path;

/// Process a crate's README.md for rustdoc, applying necessary link transformations.
///
/// Transformations:
/// 1. Strip 'src/' prefix from links so rustdoc can resolve modules
/// 2. Strip '.rs' extension so links go to modules, not files
/// 3. Convert relative README links (../../README.md) to absolute repo URLs
///
/// A crate without a README still gets a one-line crate doc built from its
/// `CARGO_PKG_DESCRIPTION`, so `include_str!` in `lib.rs` always resolves.
fn process_readme_for_rustdoc(crate_dir: &str) {
    println!("cargo:rerun-if-changed=README.md");
    println!("cargo:rerun-if-changed=../../Cargo.toml");

    let readme_path = Path::new(crate_dir).join("README.md");
    let rustdoc_content = match fs::read_to_string(&readme_path) {
        Ok(content) => {
            let mut transformed = content.replace("](src/", "](").replace(".rs)", ")");
            if let Some(url) = get_workspace_repo_url(crate_dir) {
                transformed = transformed.replace("](../../README.md", &format!("]({url}"));
            }
            transformed
        }
        Err(_) => env::var("CARGO_PKG_DESCRIPTION").unwrap_or_default(),
    };

    let out_dir = env::var("OUT_DIR").expect("cargo always sets OUT_DIR for build scripts");
    let dest_path = Path::new(&out_dir).join("README_GENERATED.md");
    fs::write(dest_path, rustdoc_content).expect("OUT_DIR is writable");
}

/// Extract repository URL from workspace Cargo.toml.
/// Returns None if the file can't be read or doesn't contain a repository field.
fn get_workspace_repo_url(crate_dir: &str) -> Option<String> {
    let workspace_toml = Path::new(crate_dir)
        .parent()? // crates/
        .parent()? // workspace root
        .join("Cargo.toml");

    let content = fs::read_to_string(workspace_toml).ok()?;

    content.lines().map(str::trim).find_map(|line| {
        if !line.starts_with("repository") || !line.contains('=') {
            return None;
        }
        let start = line.find('"')?;
        let end = line.rfind('"')?;
        (start < end).then(|| line[start + 1..end].to_string())
    })
}
