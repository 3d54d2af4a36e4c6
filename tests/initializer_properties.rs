//! Property tests for initializer loading.
//!
//! Key invariants:
//! - Every loaded initializer exposes exactly its decoded bytes, whatever
//!   the arena alignment
//! - Arena blocks never overlap

use std::sync::Arc;

use proptest::prelude::*;
use tensorpack::{
    ArenaPlanner, CpuAllocator, DeviceLocation, ElementType, Initializer, InitializerLoader, PlannerConfig,
    TensorCodec, TensorDescriptor,
};

fn initializers() -> impl Strategy<Value = Vec<(Vec<u8>, bool)>> {
    prop::collection::vec((prop::collection::vec(any::<u8>(), 0..80), any::<bool>()), 1..12)
}

proptest! {
    #[test]
    fn prop_views_match_decoded_bytes(
        tensors in initializers(),
        alignment in prop::sample::select(vec![0usize, 8, 64]),
    ) {
        let cpu = DeviceLocation::cpu();
        let codec = TensorCodec::default();
        let inits: Vec<Initializer> = tensors
            .iter()
            .enumerate()
            .map(|(id, (raw, planned))| {
                let desc = TensorDescriptor::new(format!("t{id}"), ElementType::Uint8, [raw.len() as i64])
                    .with_raw(raw.clone());
                let init = Initializer::new(id, cpu, desc);
                if *planned { init } else { init.unplanned() }
            })
            .collect();

        let mut loader = InitializerLoader::with_codec(codec.clone(), ArenaPlanner::new(PlannerConfig { alignment }));
        loader.register_allocator(Arc::new(CpuAllocator::new())).unwrap();
        let set = loader.load(&inits).unwrap();

        for init in &inits {
            let expected = codec.unpack_initializer_data(&init.descriptor).unwrap();
            prop_assert_eq!(set.bytes(&init.descriptor.name).unwrap(), expected.as_slice());
        }

        if let Ok(patterns) = set.planner().memory_patterns() {
            if let Some(pattern) = patterns.pattern(&cpu) {
                let mut blocks: Vec<_> = pattern.blocks().map(|(_, b)| *b).filter(|b| b.size > 0).collect();
                blocks.sort_by_key(|b| b.offset);
                for pair in blocks.windows(2) {
                    prop_assert!(pair[0].end() <= pair[1].offset);
                }
            }
        }
    }
}
