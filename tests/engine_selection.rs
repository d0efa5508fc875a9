mod common;

use common::Fixture;
use warp_searcher::{
    ComputeDevice, Configuration, EngineRequest, EngineVariant, SearchError, WarpConfig,
};

fn requests() -> Vec<EngineRequest> {
    vec![
        EngineRequest::Baseline,
        EngineRequest::Warp(WarpConfig::default()),
        EngineRequest::Warp(WarpConfig {
            fused_decompression_merge: true,
            ..WarpConfig::default()
        }),
    ]
}

#[test]
fn mmap_with_gpu_fails_construction() {
    for engine in requests() {
        for num_threads in [1, 4] {
            let fixture = Fixture {
                caller: Configuration::default()
                    .with_load_index_with_mmap(true)
                    .with_total_visible_gpus(1),
                engine: engine.clone(),
                num_threads,
                ..Fixture::new()
            };
            let (result, recorder) = fixture.build();
            match result {
                Err(SearchError::InvalidConfiguration { option, .. }) => {
                    assert_eq!(option, "load_index_with_mmap")
                },
                Err(other) => panic!("unexpected error: {other}"),
                Ok(_) => panic!("mmap with GPU compute must be rejected"),
            }
            assert!(recorder.selections().is_empty(), "no backend may be opened");
        }
    }
}

#[test]
fn gpu_count_from_a_lower_source_still_conflicts_with_mmap() {
    let fixture = Fixture {
        caller: Configuration::default().with_load_index_with_mmap(true),
        index: Configuration::default().with_total_visible_gpus(2),
        ..Fixture::new()
    };
    assert!(matches!(
        fixture.build().0,
        Err(SearchError::InvalidConfiguration {
            option: "load_index_with_mmap",
            ..
        })
    ));
}

#[test]
fn every_other_combination_constructs() {
    for engine in requests() {
        for num_threads in [1, 4] {
            for (gpus, mmap) in [(0, true), (0, false), (1, false)] {
                let fixture = Fixture {
                    caller: Configuration::default()
                        .with_load_index_with_mmap(mmap)
                        .with_total_visible_gpus(gpus),
                    engine: engine.clone(),
                    num_threads,
                    ..Fixture::new()
                };
                let (searcher, recorder) = fixture.searcher();
                let selection = &recorder.selections()[0];
                assert_eq!(selection, searcher.engine());
                assert_eq!(selection.load_with_mmap, mmap);
                assert_eq!(
                    selection.device,
                    if gpus > 0 { ComputeDevice::Gpu } else { ComputeDevice::Cpu }
                );
            }
        }
    }
}

#[test]
fn worker_count_picks_the_warp_variant() {
    let warp = EngineRequest::Warp(WarpConfig::default());

    let single = Fixture {
        engine: warp.clone(),
        num_threads: 1,
        ..Fixture::new()
    };
    assert!(matches!(
        single.searcher().0.engine().variant,
        EngineVariant::SingleWorker { .. }
    ));

    let multi = Fixture {
        engine: warp,
        num_threads: 6,
        ..Fixture::new()
    };
    match &multi.searcher().0.engine().variant {
        EngineVariant::MultiWorker { num_threads, .. } => assert_eq!(*num_threads, 6),
        other => panic!("unexpected variant {other}"),
    }

    let baseline = Fixture {
        num_threads: 6,
        ..Fixture::new()
    };
    assert_eq!(baseline.searcher().0.engine().variant, EngineVariant::Baseline);
}
