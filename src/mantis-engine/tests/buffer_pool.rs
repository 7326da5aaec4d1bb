//! Randomized pin/release/evict sequences against the buffer pool.

use common_config::BufferPoolConfig;
use mantis_core::{MatrixBlock, MatrixCharacteristics, ValueType};
use mantis_engine::memory::{BufferPool, MatrixHandle, Residency};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Create(u8),
    Pin(usize),
    Release(usize),
    Evict(usize),
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        (1u8..6).prop_map(Op::Create),
        any::<usize>().prop_map(Op::Pin),
        any::<usize>().prop_map(Op::Release),
        any::<usize>().prop_map(Op::Evict),
    ];
    prop::collection::vec(op, 1..60)
}

/// Distinct content per object so mixups are detected.
fn content(seed: usize, n: u8) -> MatrixBlock {
    let n = n as usize;
    let values = (0..n * n).map(|i| (seed * 1000 + i) as f64 / 7.0).collect();
    MatrixBlock::from_vec(n, n, values).unwrap()
}

struct Tracked {
    handle: MatrixHandle,
    expected: MatrixBlock,
    pins: usize,
}

fn run(ops: &[Op], budget: usize) {
    let dir = tempfile::tempdir().unwrap();
    let config = BufferPoolConfig::new(dir.path().to_string_lossy()).with_memory_budget(budget);
    let space = BufferPool::create_scratch_space(&config).unwrap();
    let pool = space.pool();
    let mut objects: Vec<Tracked> = Vec::new();

    for op in ops {
        match op {
            Op::Create(n) => {
                let expected = content(objects.len(), *n);
                if let Ok(handle) = pool.create(
                    expected.clone(),
                    MatrixCharacteristics::unknown(),
                    ValueType::Double,
                ) {
                    objects.push(Tracked {
                        handle,
                        expected,
                        pins: 0,
                    });
                }
            }
            Op::Pin(i) if !objects.is_empty() => {
                let idx = i % objects.len();
                let obj = &mut objects[idx];
                if let Ok(block) = pool.pin(&obj.handle) {
                    assert!(block.bit_eq(&obj.expected), "content changed");
                    obj.pins += 1;
                }
            }
            Op::Release(i) if !objects.is_empty() => {
                let idx = i % objects.len();
                let obj = &mut objects[idx];
                let result = pool.release(&obj.handle);
                if obj.pins == 0 {
                    assert!(result.is_err());
                } else {
                    assert!(result.is_ok());
                    obj.pins -= 1;
                }
            }
            Op::Evict(i) if !objects.is_empty() => {
                let obj = &objects[i % objects.len()];
                let before = obj.handle.residency();
                let result = pool.evict(&obj.handle);
                if obj.pins > 0 {
                    assert!(result.is_err(), "evicted a pinned object");
                    assert_eq!(obj.handle.residency(), before);
                } else {
                    assert!(result.is_ok());
                    assert_ne!(obj.handle.residency(), Residency::InMemory);
                }
            }
            _ => {}
        }

        for obj in &objects {
            assert_eq!(obj.handle.pins(), obj.pins);
            if obj.pins > 0 {
                assert_eq!(obj.handle.residency(), Residency::InMemory);
            }
        }
        if budget > 0 {
            assert!(pool.memory_used() <= budget);
        }
    }

    // Nothing was lost, whatever was evicted along the way.
    for obj in &mut objects {
        for _ in 0..obj.pins {
            pool.release(&obj.handle).unwrap();
        }
        obj.pins = 0;
    }
    for obj in &objects {
        let block = pool.pin(&obj.handle).unwrap();
        assert!(block.bit_eq(&obj.expected));
        pool.release(&obj.handle).unwrap();
    }
    for obj in &objects {
        pool.evict(&obj.handle).unwrap();
    }
    for obj in &objects {
        let block = pool.pin(&obj.handle).unwrap();
        assert!(block.bit_eq(&obj.expected));
        pool.release(&obj.handle).unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_pin_evict_invariant_unbounded(ops in arb_ops()) {
        run(&ops, 0);
    }

    #[test]
    fn prop_pin_evict_invariant_tight_budget(ops in arb_ops()) {
        let budget = MatrixBlock::new(5, 5).in_memory_size() * 3;
        run(&ops, budget);
    }
}

#[test]
fn test_spill_round_trip_is_bit_exact() {
    let dir = tempfile::tempdir().unwrap();
    let config = BufferPoolConfig::new(dir.path().to_string_lossy());
    let space = BufferPool::create_scratch_space(&config).unwrap();
    let pool = space.pool();

    let values: Vec<f64> = (0..64)
        .map(|i| match i % 4 {
            0 => f64::from(i) * 0.1,
            1 => -1.0 / f64::from(i),
            2 => f64::EPSILON * f64::from(i),
            _ => 1e-310 * f64::from(i),
        })
        .collect();
    let original = MatrixBlock::from_vec(8, 8, values).unwrap();
    let handle = pool
        .create(
            original.clone(),
            MatrixCharacteristics::new(8, 8, 4, 4),
            ValueType::Double,
        )
        .unwrap();

    assert!(pool.evict(&handle).unwrap());
    assert_eq!(handle.residency(), Residency::Evicted);
    let meta_files = std::fs::read_dir(pool.root().join("cache"))
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .map(|e| e.file_name().to_string_lossy().ends_with(".meta.json"))
                .unwrap_or(false)
        })
        .count();
    assert_eq!(meta_files, 1);

    let reloaded = pool.pin(&handle).unwrap();
    assert!(reloaded.bit_eq(&original));
    assert_eq!(handle.characteristics().rows_per_block, 4);
    pool.release(&handle).unwrap();
}
