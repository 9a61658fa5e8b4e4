use persona_core::ModelKind;

use crate::config::AppConfig;

/// Show which configured models are cached, then every cached file.
pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    let cache = super::open_cache(config)?;

    println!("{:<4} {:<10} {:<8} {}", "ID", "NAME", "CACHED", "WEIGHTS");
    println!("{}", "-".repeat(72));
    for kind in ModelKind::ALL {
        let source = config.models.get(kind).artifact_source();
        let cached = cache.is_cached(&source.repo, &source.revision, &source.gguf_file);
        println!(
            "{:<4} {:<10} {:<8} {}/{}",
            kind.wire_id(),
            kind.name(),
            if cached { "yes" } else { "no" },
            source.repo,
            source.gguf_file
        );
    }

    let repos = cache.list_models()?;
    if repos.is_empty() {
        println!("\nNothing cached in {}.", cache.root().display());
        println!("Use `persona pull` to download the configured models.");
        return Ok(());
    }

    println!();
    for (repo_id, revision) in &repos {
        println!("{repo_id} @ {revision}");
        for file in cache.list_files(repo_id, revision)? {
            println!("  {:<48} {:>10}", file.filename, human_size(file.size_bytes));
        }
    }
    Ok(())
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::human_size;

    #[test]
    fn sizes() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KiB");
        assert_eq!(human_size(7_865_536_000), "7.3 GiB");
    }
}
