use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use schemagate::router::EndpointLayout;
use schemagate::service::SchemaService;
use schemagate::upstream::{load_entities, NoContentSource};

/// Generate JSON-LD documents for every entity in a file
pub async fn generate(
    input: PathBuf,
    output: Option<PathBuf>,
    origin: String,
    parallel: bool,
) -> Result<()> {
    let site = Url::parse(&origin).with_context(|| format!("Invalid origin: {origin}"))?;
    let layout = if parallel {
        EndpointLayout::parallel()
    } else {
        EndpointLayout::default()
    };

    let entities = load_entities(&input)
        .with_context(|| format!("Failed to load entities from {}", input.display()))?;
    let service = SchemaService::new(site, layout, Arc::new(NoContentSource));
    let report = service.ingest(&entities).await;

    let documents: Vec<_> = service
        .cache()
        .keys()
        .into_iter()
        .filter_map(|key| service.cache().latest(&key))
        .collect();

    match &output {
        Some(dir) => {
            for document in &documents {
                let dir = dir.join(document.key.entity_type.slug());
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                let path = dir.join(format!("{}.jsonld", document.key.id));
                std::fs::write(&path, document.to_json_ld()?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                tracing::debug!(path = %path.display(), "Wrote schema document");
            }
            println!("Wrote {} documents to {}", documents.len(), dir.display());
        }
        None => {
            let bodies: Vec<_> = documents.iter().map(|d| &d.body).collect();
            println!("{}", serde_json::to_string_pretty(&bodies)?);
        }
    }

    for failure in &report.failures {
        eprintln!("  FAIL {}: {}", failure.key, failure.error);
    }
    if !report.failures.is_empty() {
        anyhow::bail!(
            "{} of {} entities failed",
            report.failures.len(),
            report.total()
        );
    }

    Ok(())
}
