use anyhow::{Context, Result};
use std::path::PathBuf;
use url::Url;

use schemagate::canonical::CanonicalLinker;
use schemagate::router::DEFAULT_SCHEMA_PREFIX;
use schemagate::schema::SchemaGenerator;
use schemagate::upstream::load_entities;

/// Check entities against the vocabulary and the site origin
pub fn validate(input: PathBuf, origin: String) -> Result<()> {
    let site = Url::parse(&origin).with_context(|| format!("Invalid origin: {origin}"))?;
    let linker = CanonicalLinker::new(site, DEFAULT_SCHEMA_PREFIX);
    let generator = SchemaGenerator::new();

    let entities = load_entities(&input)
        .with_context(|| format!("Failed to load entities from {}", input.display()))?;

    let mut failed = 0usize;
    for entity in &entities {
        let label = format!("{}/{} v{}", entity.entity_type.slug(), entity.id, entity.version);

        let mut problems = Vec::new();
        if let Err(e) = generator.validate(entity) {
            problems.extend(e.problems);
        }
        if let Some(url) = &entity.content_url {
            if let Err(e) = linker.check(&entity.key(), url) {
                problems.push(e.to_string());
            }
        }

        if problems.is_empty() {
            println!("  OK   {label}");
        } else {
            failed += 1;
            println!("  FAIL {label}");
            for problem in problems {
                println!("       - {problem}");
            }
        }
    }

    println!();
    println!("{} entities, {} invalid", entities.len(), failed);

    if failed > 0 {
        anyhow::bail!("{failed} invalid entities");
    }
    Ok(())
}
