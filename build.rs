use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const PREFIX: &str = "SCX_";
const QUOTED_PREFIX: &str = "\"SCX_";

fn collect_rs_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_rs_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            out.push(path);
        }
    }
    Ok(())
}

/// Variable names are the string literals that consist of nothing but
/// `SCX_[A-Z0-9_]+`; formatted messages mentioning the prefix are skipped.
fn env_key_literals(source: &str) -> impl Iterator<Item = &str> {
    source.match_indices(QUOTED_PREFIX).filter_map(move |(at, _)| {
        let body = &source[at + 1..];
        let key = &body[..body.find('"')?];
        let suffix = &key[PREFIX.len()..];
        let valid = !suffix.is_empty()
            && suffix
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');
        valid.then_some(key)
    })
}

fn write_generated_allowlist(out_dir: &Path) -> std::io::Result<()> {
    let mut rs_files = Vec::new();
    collect_rs_files(Path::new("src"), &mut rs_files)?;

    let mut keys = BTreeSet::new();
    for file in rs_files {
        let content = fs::read_to_string(&file)?;
        keys.extend(env_key_literals(&content).map(str::to_string));
    }

    let mut f = fs::File::create(out_dir.join("scx_env_allowlist.rs"))?;
    writeln!(f, "pub const GENERATED_SCX_ENV_ALLOWLIST: &[&str] = &[")?;
    for key in keys {
        writeln!(f, "    {key:?},")?;
    }
    writeln!(f, "];")?;
    Ok(())
}

fn main() {
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo"));
    write_generated_allowlist(&out_dir).expect("failed to generate SCX env allowlist");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
}
