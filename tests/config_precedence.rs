mod common;

use common::Fixture;
use proptest::prelude::*;
use std::path::PathBuf;
use warp_searcher::{ConfigResolver, Configuration};

fn with_ndocs(ndocs: Option<usize>) -> Configuration {
    Configuration {
        ndocs,
        ..Configuration::default()
    }
}

proptest! {
    #[test]
    fn first_source_that_sets_an_option_wins(
        caller in proptest::option::of(1usize..10_000),
        checkpoint in proptest::option::of(1usize..10_000),
        index in proptest::option::of(1usize..10_000),
        process in proptest::option::of(1usize..10_000),
    ) {
        let effective = ConfigResolver::resolve(
            &with_ndocs(caller),
            &with_ndocs(process),
            &with_ndocs(checkpoint),
            &with_ndocs(index),
        );
        let expected = caller.or(checkpoint).or(index).or(process);
        prop_assert_eq!(effective.ndocs, expected);
    }

    #[test]
    fn searcher_config_follows_source_precedence(
        caller in proptest::option::of(1usize..64),
        checkpoint in proptest::option::of(1usize..64),
        index in proptest::option::of(1usize..64),
        process in proptest::option::of(1usize..64),
    ) {
        let fixture = Fixture {
            caller: Configuration { query_maxlen: caller, ..Configuration::default() },
            checkpoint: Configuration { query_maxlen: checkpoint, ..Configuration::default() },
            index: Configuration { query_maxlen: index, ..Configuration::default() },
            process: Configuration { query_maxlen: process, ..Configuration::default() },
            ..Fixture::new()
        };
        let (searcher, _) = fixture.searcher();
        prop_assert_eq!(
            searcher.config().query_maxlen,
            caller.or(checkpoint).or(index).or(process)
        );
    }
}

#[test]
fn unset_everywhere_stays_unset() {
    let effective = ConfigResolver::resolve(
        &Configuration::default(),
        &Configuration::default(),
        &Configuration::default(),
        &Configuration::default(),
    );
    assert_eq!(effective, Configuration::default());
}

#[test]
fn index_config_outranks_process_defaults() {
    let fixture = Fixture {
        process: Configuration::from_env_vars(|name| match name {
            "CUDA_VISIBLE_DEVICES" => Some("0,1".to_string()),
            _ => None,
        }),
        index: Configuration::default().with_total_visible_gpus(0),
        ..Fixture::new()
    };
    let (searcher, recorder) = fixture.searcher();
    assert_eq!(searcher.config().total_visible_gpus, Some(0));
    assert_eq!(
        recorder.selections()[0].device,
        warp_searcher::ComputeDevice::Cpu
    );
}

#[test]
fn resolved_locations_are_recorded_in_the_config() {
    let (searcher, _) = Fixture::new().searcher();
    let config = searcher.config();
    assert_eq!(config.index_name.as_deref(), Some("mock"));
    assert_eq!(config.index_root, Some(PathBuf::from("indexes")));
    assert_eq!(config.checkpoint, Some(PathBuf::from("checkpoints/mock")));
    assert_eq!(searcher.index_path(), PathBuf::from("indexes").join("mock"));
}

#[test]
fn checkpoint_location_precedence() {
    use common::{MemoryCheckpointStore, MemoryIndexStore, Recorder};
    use warp_searcher::config::LocationOverrides;

    let recorder = Recorder::default();
    let index_store = MemoryIndexStore {
        config: Configuration::default().with_checkpoint("from-index"),
        num_results: 0,
        fail_column: None,
        recorder: recorder.clone(),
    };
    let checkpoint_store = MemoryCheckpointStore {
        config: Configuration::default(),
        recorder,
    };
    let resolve = |overrides: &LocationOverrides, caller: &Configuration| {
        ConfigResolver::load(
            "mock",
            overrides,
            caller,
            &Configuration::default(),
            &index_store,
            &checkpoint_store,
        )
        .unwrap()
        .checkpoint
    };

    let no_overrides = LocationOverrides::default();
    let caller = Configuration::default().with_checkpoint("from-caller");
    assert_eq!(
        resolve(&no_overrides, &Configuration::default()),
        PathBuf::from("from-index")
    );
    assert_eq!(resolve(&no_overrides, &caller), PathBuf::from("from-caller"));

    let explicit = LocationOverrides {
        checkpoint: Some(PathBuf::from("explicit")),
        ..LocationOverrides::default()
    };
    assert_eq!(resolve(&explicit, &caller), PathBuf::from("explicit"));
}
