//! End-to-end pipeline tests: sweep fixture → dispatcher → artifacts
//!
//! Covers the full contract: artifact naming, sequential abort policy,
//! parallel failure isolation, and sequential/parallel parity.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use trajplot::dispatch::{run_all, JobConfig, JobState};
use trajplot::figure::default_figure_spec;
use trajplot::plots::{SPIKE_SERIES, THRESHOLD_SERIES, WEIGHT_SERIES};
use trajplot::store::{LoadDepth, ParamValue, Series, SweepStore, SweepWriter};
use trajplot::Error;

const PARAMS: [&str; 7] = [
    "netw.n_exc",
    "netw.n_inh",
    "neuron.tau_mem",
    "synapse.tau",
    "stdp.eta",
    "sn.target_rate",
    "strct.prune_rate",
];

fn weight_series(idx: usize) -> Series {
    let base = 0.05 * (idx as f64 + 1.0);
    Series {
        times: vec![0.0, 1.0, 2.0, 3.0, 4.0],
        values: (0..5)
            .map(|t| {
                (0..6)
                    .map(|j| {
                        if j % 3 == 0 {
                            0.0
                        } else {
                            base + 0.01 * (t * 6 + j) as f64
                        }
                    })
                    .collect()
            })
            .collect(),
    }
}

fn spike_series() -> Series {
    Series {
        times: vec![0.1, 0.5, 1.2, 2.0, 2.8, 3.9],
        values: vec![
            vec![0.0],
            vec![1.0],
            vec![0.0],
            vec![2.0],
            vec![1.0],
            vec![2.0],
        ],
    }
}

fn threshold_series() -> Series {
    Series {
        times: vec![0.0, 2.0, 4.0],
        values: vec![vec![-50.0, -50.0], vec![-49.5, -50.2], vec![-49.0, -50.4]],
    }
}

/// Write a sweep with `runs` runs; `corrupt` marks one run whose weight
/// series payload is malformed JSON.
fn write_sweep(path: &Path, runs: usize, corrupt: Option<usize>) {
    let mut writer = SweepWriter::create(
        path,
        &PARAMS,
        &[WEIGHT_SERIES, SPIKE_SERIES, THRESHOLD_SERIES],
    )
    .unwrap();

    for idx in 0..runs {
        for (k, name) in PARAMS.iter().enumerate() {
            let value = 10.0 * (k as f64 + 1.0) + idx as f64;
            writer.add_parameter(name, &ParamValue::Scalar(value)).unwrap();
        }
        if corrupt == Some(idx) {
            writer
                .add_series_json(WEIGHT_SERIES, "{\"times\": [0.0], \"values\": ")
                .unwrap();
        } else {
            writer.add_series(WEIGHT_SERIES, &weight_series(idx)).unwrap();
        }
        writer.add_series(SPIKE_SERIES, &spike_series()).unwrap();
        writer.add_series(THRESHOLD_SERIES, &threshold_series()).unwrap();
        writer.finish_run().unwrap();
    }
    writer.close().unwrap();
}

fn config_for(sweep: &Path, out_dir: PathBuf) -> JobConfig {
    let mut config = JobConfig::for_sweep(sweep, default_figure_spec().unwrap());
    config.out_dir = out_dir;
    config
}

fn artifact_names(dir: &Path) -> BTreeSet<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn test_sequential_three_run_sweep_yields_named_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = dir.path().join("demo.traj");
    write_sweep(&sweep, 3, None);

    let config = config_for(&sweep, dir.path().join("figures"));
    let reports = run_all(&config, 3, false, 1).unwrap();

    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.state() == JobState::Done));
    // in-order execution on the calling thread
    let indices: Vec<usize> = reports.iter().map(|r| r.index()).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    let expected: BTreeSet<String> = [
        "demo_run_00000000.png",
        "demo_run_00000001.png",
        "demo_run_00000002.png",
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    assert_eq!(artifact_names(&config.out_dir), expected);
}

#[test]
fn test_parallel_corrupted_run_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = dir.path().join("corrupt.traj");
    write_sweep(&sweep, 3, Some(1));

    let config = config_for(&sweep, dir.path().join("figures"));
    let reports = run_all(&config, 3, true, 2).unwrap();

    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].state(), JobState::Done);
    assert_eq!(reports[1].state(), JobState::Failed);
    assert!(reports[1].error().is_some());
    assert_eq!(reports[2].state(), JobState::Done);

    let expected: BTreeSet<String> = [
        "corrupt_run_00000000.png",
        "corrupt_run_00000002.png",
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    assert_eq!(artifact_names(&config.out_dir), expected);
}

#[test]
fn test_sequential_aborts_on_first_failure() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = dir.path().join("abort.traj");
    write_sweep(&sweep, 3, Some(1));

    let config = config_for(&sweep, dir.path().join("figures"));
    let reports = run_all(&config, 3, false, 1).unwrap();

    // run 2 never dispatched
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].state(), JobState::Done);
    assert_eq!(reports[1].state(), JobState::Failed);
    assert_eq!(
        artifact_names(&config.out_dir),
        ["abort_run_00000000.png"]
            .iter()
            .map(ToString::to_string)
            .collect()
    );
}

#[test]
fn test_parallel_matches_sequential_artifact_set() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = dir.path().join("parity.traj");
    write_sweep(&sweep, 4, None);

    let seq_config = config_for(&sweep, dir.path().join("figs_seq"));
    let seq_reports = run_all(&seq_config, 4, false, 1).unwrap();
    assert!(seq_reports.iter().all(|r| r.state() == JobState::Done));

    for pool_size in [1, 3, 8] {
        let out = dir.path().join(format!("figs_p{pool_size}"));
        let par_config = config_for(&sweep, out.clone());
        let par_reports = run_all(&par_config, 4, true, pool_size).unwrap();
        assert!(par_reports.iter().all(|r| r.state() == JobState::Done));
        assert_eq!(artifact_names(&out), artifact_names(&seq_config.out_dir));
    }
}

#[test]
fn test_run_count_matches_enumeration_until_exhaustion() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = dir.path().join("enum.traj");
    write_sweep(&sweep, 5, None);

    let store = SweepStore::open(&sweep).unwrap();
    let mut enumerated = 0;
    loop {
        match store.load_run(enumerated, LoadDepth::Skeleton) {
            Ok(_) => enumerated += 1,
            Err(Error::RunNotFound { .. }) => break,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(enumerated, store.run_count());
}

#[test]
fn test_every_run_matches_declared_parameter_schema() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = dir.path().join("schema.traj");
    write_sweep(&sweep, 3, None);

    let store = SweepStore::open(&sweep).unwrap();
    let declared: BTreeSet<&str> = store
        .parameter_names()
        .iter()
        .map(String::as_str)
        .collect();
    for idx in 0..store.run_count() {
        let run = store.load_run(idx, LoadDepth::Full).unwrap();
        let loaded: BTreeSet<&str> = run.parameters().keys().map(String::as_str).collect();
        assert_eq!(loaded, declared, "run {idx}");
    }
}

#[test]
fn test_load_run_boundary_is_run_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = dir.path().join("bounds.traj");
    write_sweep(&sweep, 2, None);

    let store = SweepStore::open(&sweep).unwrap();
    let err = store.load_run(store.run_count(), LoadDepth::Full).unwrap_err();
    assert!(matches!(err, Error::RunNotFound { index: 2, count: 2 }));
}

#[test]
fn test_rerender_is_idempotent_and_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = dir.path().join("stable.traj");
    write_sweep(&sweep, 1, None);

    let config = config_for(&sweep, dir.path().join("figures"));
    run_all(&config, 1, false, 1).unwrap();
    let artifact = config.out_dir.join("stable_run_00000000.png");
    let first = fs::read(&artifact).unwrap();

    // second invocation re-renders everything; directory already exists
    run_all(&config, 1, false, 1).unwrap();
    let second = fs::read(&artifact).unwrap();
    assert_eq!(first, second);
}
