//! Pipeline runs driven entirely from files on disk.

use calibrator::{load_pipeline_config, read_dataset, read_geometry, write_dataset, Pipeline};
use ensemble_field::Variable;
use test_utils::{
    create_phase_dataset, create_precipitation_dataset, create_temperature_dataset,
    create_terrain_geometry,
    parameter_files, ParameterFileFixture,
};

// =============================================================================
// HELPERS
// =============================================================================

fn write(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

// =============================================================================
// FULL RUNS
// =============================================================================

#[test]
fn test_calibrate_and_downscale_from_files() {
    let fixture = ParameterFileFixture::new("t_regression.txt", "0 0.0 1.0\n").unwrap();
    let dir = fixture.dir();
    let config_path = write(
        dir,
        "pipeline.yaml",
        r#"
steps:
  - calibrator: { type: regression, variable: t }
    parameters: { path: t_regression.txt }
downscaler:
  type: gradient
  variable: t
  constant_gradient: -0.0065
"#,
    );

    let input_path = dir.join("input.json");
    write_dataset(&input_path, &create_temperature_dataset(5, 5, 3, 2)).unwrap();

    let target = create_terrain_geometry(9, 9, 50.0);
    let target_path = write(dir, "target.json", &serde_json::to_string(&target).unwrap());

    let config = load_pipeline_config(&config_path).unwrap();
    let pipeline = Pipeline::from_config(&config, config_path.parent()).unwrap();
    let dataset = read_dataset(&input_path).unwrap();
    let target = read_geometry(&target_path).unwrap();
    let outcome = pipeline.run(dataset, Some(target)).unwrap();

    let output_path = dir.join("output.json");
    write_dataset(&output_path, &outcome.dataset).unwrap();
    let written = read_dataset(&output_path).unwrap();

    assert_eq!(written.shape(), (9, 9, 3, 2));
    let field = written.field(Variable::T).unwrap();
    assert!(field.data().iter().all(|v| v.is_finite()));
    // Source elevations are missing, so values equal the nearest source value.
    assert_eq!(field.get(0, 0, 0, 0), 270.0);
    assert_eq!(outcome.reports.len(), 1);
    assert!(outcome.reports[0].1.is_clean());
}

#[test]
fn test_zaga_pipeline_keeps_missing_ensembles_raw() {
    let fixture = ParameterFileFixture::new("zaga.txt", parameter_files::ZAGA_SINGLE_TIME).unwrap();
    let dir = fixture.dir();
    let config_path = write(
        dir,
        "pipeline.yaml",
        "steps:\n  - calibrator: { type: zaga }\n    parameters: { path: zaga.txt }\n",
    );

    let mut dataset = create_precipitation_dataset(4, 4, 6, 1, 3);
    dataset
        .field_mut(Variable::Precip)
        .unwrap()
        .set(2, 2, 0, 0, f32::NAN);
    let raw_cell = dataset.field(Variable::Precip).unwrap().cell(2, 2, 0).to_vec();

    let config = load_pipeline_config(&config_path).unwrap();
    let pipeline = Pipeline::from_config(&config, config_path.parent()).unwrap();
    let outcome = pipeline.run(dataset, None).unwrap();

    let (variable, report) = &outcome.reports[0];
    assert_eq!(*variable, Variable::Precip);
    assert_eq!(report.missing_raw, 1);
    assert_eq!(report.total_cells, 16);

    let cell = outcome.dataset.field(Variable::Precip).unwrap().cell(2, 2, 0);
    assert!(cell[0].is_nan());
    assert_eq!(&cell[1..], &raw_cell[1..], "ensemble with a missing member is left as is");
}

#[test]
fn test_phase_step_follows_temperature_calibration() {
    let fixture = ParameterFileFixture::new("phase.txt", parameter_files::PHASE_THRESHOLDS).unwrap();
    let dir = fixture.dir();
    write(dir, "t_warm.txt", "0 2.5 1.0\n");
    let config_path = write(
        dir,
        "pipeline.yaml",
        r#"
steps:
  - calibrator: { type: regression, variable: t }
    parameters: { path: t_warm.txt }
  - calibrator: { type: phase, min_precip: 0.5 }
    parameters: { path: phase.txt }
"#,
    );

    let config = load_pipeline_config(&config_path).unwrap();
    let pipeline = Pipeline::from_config(&config, config_path.parent()).unwrap();
    let outcome = pipeline.run(create_phase_dataset(4, 4, 2, 1), None).unwrap();

    let variables: Vec<Variable> = outcome.reports.iter().map(|(v, _)| *v).collect();
    assert_eq!(variables, [Variable::T, Variable::Phase]);

    // 272.5K would be snow; warmed by 2.5K it is sleet.
    let phase = outcome.dataset.field(Variable::Phase).unwrap();
    assert_eq!(phase.get(1, 0, 0, 0), 2.0);
    assert_eq!(phase.get(0, 0, 0, 0), 0.0, "dry row");
}

#[test]
fn test_unknown_variable_fails_the_run() {
    let fixture = ParameterFileFixture::new("p.txt", "0 1.0\n").unwrap();
    let config_path = write(
        fixture.dir(),
        "pipeline.yaml",
        "steps:\n  - calibrator: { type: regression, variable: rh }\n    parameters: { path: p.txt }\n",
    );
    let config = load_pipeline_config(&config_path).unwrap();
    let pipeline = Pipeline::from_config(&config, config_path.parent()).unwrap();

    let err = pipeline
        .run(create_temperature_dataset(2, 2, 1, 1), None)
        .unwrap_err();
    assert!(format!("{:#}", err).contains("rh"));
}
