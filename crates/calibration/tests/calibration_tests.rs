//! End-to-end tests: parameter files on disk, configured steps, full passes.

use std::sync::Arc;

use approx::assert_relative_eq;
use calibration::{
    build_strategy, CalibrationError, CalibrationStep, Calibrator, CalibratorConfig,
    DatasetCalibration, ExtrapolationPolicy, ParameterFile, ParameterLayout, ParameterSource,
    ParameterSourceConfig, Parameters, PhaseCalibrator, PrecipPhase, Regression, Zaga,
};
use ensemble_field::{all_valid, GriddedField, Variable};
use test_utils::{
    create_phase_dataset, create_precipitation_dataset, create_temperature_dataset, create_test_geometry, parameter_files,
    parameters, with_missing, ParameterFileFixture,
};

// =============================================================================
// REGRESSION
// =============================================================================

#[test]
fn test_zero_order_regression_sets_every_gridpoint() {
    let mut dataset = create_temperature_dataset(10, 10, 1, 1);
    let calibrator = Calibrator::new(
        Box::new(Regression::new(Variable::T)),
        Arc::new(ParameterFile::constant(Parameters::new(
            parameters::REGRESSION_CONSTANT.to_vec(),
        ))),
    )
    .unwrap();

    let report = calibrator.calibrate(&mut dataset).unwrap();
    assert_eq!(report.total_cells, 100);
    assert!(report.is_clean());

    let field = dataset.field(Variable::T).unwrap();
    for i in 0..10 {
        for j in 0..10 {
            assert_relative_eq!(field.get(i, j, 0, 0), 0.3, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_regression_parameters_by_lead_time_from_file() {
    let fixture = ParameterFileFixture::new("regression.txt", parameter_files::REGRESSION_BY_TIME).unwrap();
    let step = CalibrationStep {
        calibrator: CalibratorConfig::Regression { variable: Variable::T },
        parameters: ParameterSourceConfig {
            path: "regression.txt".into(),
            layout: ParameterLayout::Global,
        },
    };
    let calibrator = step.build(Some(fixture.dir())).unwrap();

    let mut dataset = create_temperature_dataset(3, 4, 2, 3);
    calibrator.calibrate(&mut dataset).unwrap();

    let field = dataset.field(Variable::T).unwrap();
    for (t, expected) in [(0, 0.3), (1, 0.4), (2, 0.5)] {
        assert!(
            field.time_slice(t).iter().all(|&v| (v - expected).abs() < 1e-6),
            "lead time {} should be {}",
            t,
            expected
        );
    }
}

#[test]
fn test_lead_time_without_parameters_is_a_configuration_error() {
    let fixture = ParameterFileFixture::new("regression.txt", parameter_files::REGRESSION_BY_TIME).unwrap();
    let source = ParameterFile::from_path(fixture.path(), ParameterLayout::Global).unwrap();
    let calibrator = Calibrator::new(Box::new(Regression::new(Variable::T)), Arc::new(source)).unwrap();

    let mut dataset = create_temperature_dataset(2, 2, 1, 4);
    let before = dataset.clone();
    let err = calibrator.calibrate(&mut dataset).unwrap_err();
    assert!(matches!(err, CalibrationError::MissingParameters { time: 3 }));
    assert_eq!(dataset, before, "dataset must be untouched on error");
}

#[test]
fn test_spatial_parameters_from_file() {
    let fixture = ParameterFileFixture::new("sites.txt", parameter_files::REGRESSION_TWO_SITES).unwrap();
    let source = ParameterFile::from_path(fixture.path(), ParameterLayout::Spatial).unwrap();
    assert!(source.is_location_dependent());
    let calibrator = Calibrator::new(Box::new(Regression::new(Variable::T)), Arc::new(source)).unwrap();

    // Longitudes 5.0 .. 5.9: columns up to 5.4 are nearer the western site.
    let mut dataset = create_temperature_dataset(2, 10, 1, 1);
    calibrator.calibrate(&mut dataset).unwrap();
    let field = dataset.field(Variable::T).unwrap();
    assert_eq!(field.get(0, 0, 0, 0), 1.0);
    assert_eq!(field.get(1, 4, 0, 0), 1.0);
    assert_eq!(field.get(0, 6, 0, 0), 2.0);
    assert_eq!(field.get(1, 9, 0, 0), 2.0);
}

// =============================================================================
// QUANTILE MAPPING
// =============================================================================

#[test]
fn test_odd_quantile_table_is_rejected() {
    let fixture = ParameterFileFixture::new("qq.txt", parameter_files::QQ_ODD_COUNT).unwrap();
    let step = CalibrationStep {
        calibrator: CalibratorConfig::Qq {
            variable: Variable::T,
            extrapolation: ExtrapolationPolicy::OneToOne,
        },
        parameters: ParameterSourceConfig {
            path: fixture.path().to_path_buf(),
            layout: ParameterLayout::Global,
        },
    };
    let err = step.build(None).unwrap_err();
    assert!(matches!(err, CalibrationError::InvalidParameterCount { found: 3, .. }));
}

#[test]
fn test_quantile_mapping_passes_missing_members_through() {
    let strategy = build_strategy(&CalibratorConfig::Qq {
        variable: Variable::T,
        extrapolation: ExtrapolationPolicy::Zero,
    })
    .unwrap();
    let calibrator = Calibrator::new(
        strategy,
        Arc::new(ParameterFile::constant(Parameters::new(parameters::QQ_IDENTITY.to_vec()))),
    )
    .unwrap();

    let geometry = create_test_geometry(1, 2);
    let raw = with_missing(
        GriddedField::from_vec(1, 2, 2, 1, vec![5.0, 15.0, -3.0, 8.0]).unwrap(),
        &[(0, 1, 0, 0)],
    );
    let (out, report) = calibrator.calibrate_field(&raw, &geometry).unwrap();

    assert_eq!(out.cell(0, 0, 0), &[5.0, 10.0]);
    assert!(out.get(0, 1, 0, 0).is_nan());
    assert_eq!(out.get(0, 1, 1, 0), 8.0);
    assert_eq!(report.missing_raw, 1);
}

#[test]
fn test_quantile_table_without_complete_pairs_keeps_raw_values() {
    let nan = f32::NAN;
    let calibrator = Calibrator::new(
        build_strategy(&CalibratorConfig::Qq {
            variable: Variable::T,
            extrapolation: ExtrapolationPolicy::OneToOne,
        })
        .unwrap(),
        Arc::new(ParameterFile::constant(Parameters::new(vec![nan, 1.0, 2.0, nan]))),
    )
    .unwrap();

    let mut dataset = create_temperature_dataset(3, 3, 2, 1);
    let raw = dataset.field(Variable::T).unwrap().clone();
    let report = calibrator.calibrate(&mut dataset).unwrap();

    assert_eq!(dataset.field(Variable::T).unwrap(), &raw);
    assert!(all_valid(dataset.field(Variable::T).unwrap().data()));
    assert_eq!(report.reverted, 9);
    assert!(!report.is_clean());
}

// =============================================================================
// ZERO-ADJUSTED GAMMA
// =============================================================================

#[test]
fn test_zaga_pass_over_precipitation_dataset() {
    let fixture = ParameterFileFixture::new("zaga.txt", parameter_files::ZAGA_SINGLE_TIME).unwrap();
    let step = CalibrationStep {
        calibrator: CalibratorConfig::Zaga {
            variable: Variable::Precip,
            fraction_threshold: 0.5,
            max_ens_mean: 100.0,
        },
        parameters: ParameterSourceConfig {
            path: fixture.path().to_path_buf(),
            layout: ParameterLayout::Global,
        },
    };
    let calibrator = step.build(None).unwrap();

    let mut dataset = create_precipitation_dataset(6, 7, 10, 2, 11);
    let raw = dataset.field(Variable::Precip).unwrap().clone();
    let report = calibrator.calibrate(&mut dataset).unwrap();
    assert_eq!(report.total_cells, 6 * 7 * 2);
    assert!(report.is_clean(), "report: {:?}", report);

    let out = dataset.field(Variable::Precip).unwrap();
    for t in 0..2 {
        for i in 0..6 {
            for j in 0..7 {
                let before = raw.cell(i, j, t);
                let after = out.cell(i, j, t);
                assert!(all_valid(after));
                assert!(after.iter().all(|&v| v >= 0.0), "precipitation must be non-negative");
                for x in 0..before.len() {
                    for y in 0..before.len() {
                        if before[x] < before[y] {
                            assert!(after[x] <= after[y], "rank order broken at ({}, {}, {})", i, j, t);
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn test_zaga_reverts_when_coefficients_are_invalid() {
    let mut bad = parameters::ZAGA_HALF_DRY.to_vec();
    bad[0] = f32::NAN;
    let calibrator = Calibrator::new(
        Box::new(Zaga::new(Variable::Precip)),
        Arc::new(ParameterFile::constant(Parameters::new(bad))),
    )
    .unwrap();

    let mut dataset = create_precipitation_dataset(3, 3, 5, 1, 5);
    let raw = dataset.field(Variable::Precip).unwrap().clone();
    let report = calibrator.calibrate(&mut dataset).unwrap();

    assert_eq!(report.reverted, 9);
    assert_eq!(report.missing_raw, 0);
    let out = dataset.field(Variable::Precip).unwrap();
    for i in 0..3 {
        for j in 0..3 {
            assert_eq!(out.cell(i, j, 0), raw.cell(i, j, 0), "cell ({}, {}) not reverted", i, j);
        }
    }
}

#[test]
fn test_zaga_wet_ensembles_with_skewed_gamma_are_calibrated() {
    let calibrator = Calibrator::new(
        Box::new(Zaga::new(Variable::Precip)),
        Arc::new(ParameterFile::constant(Parameters::new(parameters::ZAGA_TYPICAL.to_vec()))),
    )
    .unwrap();

    // Ensemble means near the cap give a gamma shape well below 1.
    let raw = GriddedField::from_fn(2, 2, 10, 1, |i, j, e, _| 60.0 + 10.0 * (i + j + e) as f32);
    let mut dataset = create_precipitation_dataset(2, 2, 10, 1, 1);
    dataset.set_field(Variable::Precip, raw.clone()).unwrap();

    let report = calibrator.calibrate(&mut dataset).unwrap();
    assert!(report.is_clean(), "report: {:?}", report);

    let out = dataset.field(Variable::Precip).unwrap();
    assert!(all_valid(out.data()));
    assert_ne!(out, &raw);
}

// =============================================================================
// CHAINED STEPS
// =============================================================================

#[test]
fn test_regression_then_quantile_mapping() {
    let regression = Calibrator::new(
        Box::new(Regression::new(Variable::T)),
        Arc::new(ParameterFile::constant(Parameters::new(parameters::REGRESSION_LINEAR.to_vec()))),
    )
    .unwrap();
    let qq = Calibrator::new(
        build_strategy(&CalibratorConfig::Qq {
            variable: Variable::T,
            extrapolation: ExtrapolationPolicy::MeanSlope,
        })
        .unwrap(),
        Arc::new(ParameterFile::constant(Parameters::new(parameters::QQ_THREE_POINT.to_vec()))),
    )
    .unwrap();

    let geometry = create_test_geometry(1, 3);
    let raw = GriddedField::from_vec(1, 3, 1, 1, vec![5.0, 15.0, 25.0]).unwrap();
    let (linear, _) = regression.calibrate_field(&raw, &geometry).unwrap();
    let (mapped, report) = qq.calibrate_field(&linear, &geometry).unwrap();

    // 0.5 + 0.9x gives 5, 14 and 23; the table maps those to 2.5, 15 and 34.5.
    assert_relative_eq!(mapped.get(0, 0, 0, 0), 2.5, epsilon = 1e-4);
    assert_relative_eq!(mapped.get(0, 1, 0, 0), 15.0, epsilon = 1e-4);
    assert_relative_eq!(mapped.get(0, 2, 0, 0), 34.5, epsilon = 1e-4);
    assert!(report.is_clean());
}

// =============================================================================
// PRECIPITATION PHASE
// =============================================================================

fn phase_step(path: &std::path::Path) -> CalibrationStep {
    CalibrationStep {
        calibrator: CalibratorConfig::Phase { min_precip: 0.2 },
        parameters: ParameterSourceConfig {
            path: path.to_path_buf(),
            layout: ParameterLayout::Global,
        },
    }
}

#[test]
fn test_phase_pass_classifies_every_member() {
    let fixture = ParameterFileFixture::new("phase.txt", parameter_files::PHASE_THRESHOLDS).unwrap();
    let phase = phase_step(fixture.path()).build(None).unwrap();
    assert_eq!(phase.variable(), Variable::Phase);

    // Temperature rises 2.5K per row and column from 270K; row 0 is dry.
    let mut dataset = create_phase_dataset(4, 4, 1, 1);
    let report = phase.calibrate(&mut dataset).unwrap();
    assert_eq!(report.total_cells, 16);
    assert!(report.is_clean(), "report: {:?}", report);

    use PrecipPhase::{None as Dry, Rain, Sleet, Snow};
    let expected = [
        [Dry, Dry, Dry, Dry],
        [Snow, Sleet, Rain, Rain],
        [Sleet, Rain, Rain, Rain],
        [Rain, Rain, Rain, Rain],
    ];
    let field = dataset.field(Variable::Phase).unwrap();
    for (i, row) in expected.iter().enumerate() {
        for (j, category) in row.iter().enumerate() {
            assert_eq!(field.get(i, j, 0, 0), category.value(), "gridpoint ({}, {})", i, j);
        }
    }
}

#[test]
fn test_phase_missing_inputs_give_missing_members() {
    let phase = PhaseCalibrator::new(Arc::new(ParameterFile::constant(Parameters::new(vec![
        273.7, 274.7,
    ]))))
    .unwrap();

    let mut dataset = create_phase_dataset(3, 3, 2, 1);
    let rh = with_missing(dataset.field(Variable::Rh).unwrap().clone(), &[(1, 1, 0, 0)]);
    dataset.set_field(Variable::Rh, rh).unwrap();

    let report = phase.calibrate(&mut dataset).unwrap();
    assert_eq!(report.missing_raw, 1);

    let field = dataset.field(Variable::Phase).unwrap();
    assert!(field.get(1, 1, 0, 0).is_nan());
    assert!(!field.get(1, 1, 1, 0).is_nan());
}

#[test]
fn test_phase_missing_thresholds_leave_phase_missing() {
    let phase = PhaseCalibrator::new(Arc::new(ParameterFile::constant(Parameters::new(vec![
        f32::NAN,
        1.5,
    ]))))
    .unwrap();

    let mut dataset = create_phase_dataset(3, 4, 2, 2);
    let report = phase.calibrate(&mut dataset).unwrap();
    assert_eq!(report.unresolved, 3 * 4 * 2);
    assert!(dataset
        .field(Variable::Phase)
        .unwrap()
        .data()
        .iter()
        .all(|v| v.is_nan()));
}

#[test]
fn test_phase_requires_every_input_field() {
    let fixture = ParameterFileFixture::new("phase.txt", parameter_files::PHASE_THRESHOLDS).unwrap();
    let phase = phase_step(fixture.path()).build(None).unwrap();

    let mut dataset = create_phase_dataset(2, 2, 1, 1);
    dataset.take_field(Variable::P);
    let err = phase.calibrate(&mut dataset).unwrap_err();
    assert!(matches!(err, CalibrationError::MissingVariable(Variable::P)));
    assert!(!dataset.has_field(Variable::Phase));
}
