use std::fs;
use std::sync::Arc;

use camino::Utf8Path;
use ricochet::Engine;
use ricochet_config::ResolvedConfig;

const CONFIG: &str = r#"
jobs:
  - name: deploy
    full_name: team/deploy
    parameters:
      - name: REGION
        kind: choice
        script: { primary: "['us', 'eu:selected']" }
      - name: ZONE
        kind: cascade
        referenced_parameters: REGION
        script:
          primary: "[PREFIX ~ '-1', PREFIX ~ '-2']"
          fallback: "['EMPTY!']"
          static_parameters:
            - name: PREFIX
              value: "zone-${REGION}"
"#;

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join(".config")).unwrap();
    fs::write(dir.path().join(".config/ricochet.yaml"), CONFIG).unwrap();
    dir
}

#[test]
fn test_discover_from_project() {
    let dir = project();
    let root = Utf8Path::from_path(dir.path()).unwrap();

    let config = ResolvedConfig::discover_from(root).unwrap().unwrap();
    assert_eq!(config.root.as_deref(), Some(root));

    let job = config.job("deploy").unwrap();
    assert_eq!(job.job.full_name, "team/deploy");
    assert_eq!(
        job.parameters.iter().map(|p| p.name()).collect::<Vec<_>>(),
        ["REGION", "ZONE"]
    );
}

#[test]
fn test_missing_config_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8Path::from_path(dir.path()).unwrap();
    assert!(ResolvedConfig::discover_from(root).unwrap().is_none());
}

#[test]
fn test_loaded_parameters_drive_the_engine() {
    let dir = project();
    let root = Utf8Path::from_path(dir.path()).unwrap();
    let config = ResolvedConfig::discover_from(root).unwrap().unwrap();
    let engine = Engine::new(Arc::new(config.runner.build_runner()));
    let job = config.job("deploy").unwrap();

    let region = engine
        .render(job.parameter("REGION").unwrap().clone(), Some(job.job.clone()))
        .unwrap();
    assert_eq!(region.default_value(), "eu");

    let mut zone = engine
        .render(job.parameter("ZONE").unwrap().clone(), Some(job.job.clone()))
        .unwrap();
    // static parameters are bound unexpanded until an update arrives
    assert_eq!(
        zone.choices().labels().collect::<Vec<_>>(),
        ["zone-${REGION}-1", "zone-${REGION}-2"]
    );

    zone.apply_update("REGION=eu");
    assert_eq!(
        zone.choices().labels().collect::<Vec<_>>(),
        ["zone-eu-1", "zone-eu-2"]
    );
}
