//! Arena planner behaviour across locations and lookups.

use std::sync::Arc;

use proptest::prelude::*;
use tensorpack_codec::TensorDescriptor;
use tensorpack_common::{ElementType, PlannerConfig};
use tensorpack_planner::{ArenaPlanner, BufferLookup, CpuAllocator, DeviceLocation};

fn bytes(name: &str, len: i64) -> TensorDescriptor {
    TensorDescriptor::new(name, ElementType::Uint8, [len])
}

#[test]
fn zero_size_and_untraced_are_distinct() {
    let cpu = DeviceLocation::cpu();
    let mut planner = ArenaPlanner::new(PlannerConfig { alignment: 0 });
    planner.register_allocator(Arc::new(CpuAllocator::new())).unwrap();
    planner.trace(0, cpu, &bytes("A", 100)).unwrap();
    planner.trace(1, cpu, &bytes("B", 0)).unwrap();
    planner.trace(2, cpu, &bytes("C", 50)).unwrap();

    let planned = planner.finalize().unwrap();
    assert_eq!(planned[&cpu], 150);
    assert_eq!(planner.memory_patterns().unwrap().pattern(&cpu).unwrap().peak_size(), 150);

    match planner.get_buffer(0, &cpu).unwrap() {
        BufferLookup::Planned(buf) => assert_eq!(buf.len(), 100),
        other => panic!("expected planned buffer, got {other:?}"),
    }
    assert!(matches!(planner.get_buffer(1, &cpu).unwrap(), BufferLookup::Empty));
    match planner.get_buffer(3, &cpu).unwrap() {
        BufferLookup::NotTraced(alloc) => assert_eq!(alloc.location(), cpu),
        other => panic!("expected not traced, got {other:?}"),
    }
}

#[test]
fn one_reservation_per_location() {
    let cpu = DeviceLocation::cpu();
    let gpu = DeviceLocation::cuda(0);
    let host = Arc::new(CpuAllocator::new());
    let device = Arc::new(CpuAllocator::for_location(gpu));

    let mut planner = ArenaPlanner::new(PlannerConfig::default());
    planner.register_allocator(host.clone()).unwrap();
    planner.register_allocator(device.clone()).unwrap();
    for id in 0..4 {
        planner.trace(id, cpu, &bytes("h", 10)).unwrap();
    }
    planner.trace(4, gpu, &bytes("d", 1)).unwrap();

    let planned = planner.finalize().unwrap();
    insta::assert_debug_snapshot!(planned, @r"
    {
        DeviceLocation {
            device: Cpu,
            memory: Default,
        }: 256,
        DeviceLocation {
            device: Cuda(
                0,
            ),
            memory: Default,
        }: 64,
    }
    ");
    assert_eq!(host.reserve_calls(), 1);
    assert_eq!(device.reserve_calls(), 1);
    assert_eq!(host.reserved_bytes(), 256);
}

proptest! {
    #[test]
    fn prop_blocks_are_disjoint_and_within_peak(sizes in prop::collection::vec(0i64..300, 1..24), alignment in prop::sample::select(vec![0usize, 16, 64])) {
        let cpu = DeviceLocation::cpu();
        let mut planner = ArenaPlanner::new(PlannerConfig { alignment });
        planner.register_allocator(Arc::new(CpuAllocator::new())).unwrap();
        for (id, &len) in sizes.iter().enumerate() {
            planner.trace(id, cpu, &bytes("t", len)).unwrap();
        }
        planner.finalize().unwrap();

        let patterns = planner.memory_patterns().unwrap();
        let pattern = patterns.pattern(&cpu).unwrap();
        let mut blocks: Vec<_> = pattern.blocks().map(|(_, b)| *b).filter(|b| b.size > 0).collect();
        blocks.sort_by_key(|b| b.offset);
        for pair in blocks.windows(2) {
            prop_assert!(pair[0].end() <= pair[1].offset);
        }
        for b in &blocks {
            prop_assert!(b.end() <= pattern.peak_size());
            if alignment > 0 {
                prop_assert_eq!(b.offset % alignment, 0);
            }
        }
        for (id, &len) in sizes.iter().enumerate() {
            let lookup = planner.get_buffer(id, &cpu).unwrap();
            prop_assert_eq!(lookup.is_planned(), len > 0);
        }
    }
}
