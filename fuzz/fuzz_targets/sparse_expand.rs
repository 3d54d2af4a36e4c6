#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tensorpack::{ElementType, SparseTensorDescriptor, TensorCodec, TensorDescriptor, dense_to_sparse, sparse_to_dense};

#[derive(Arbitrary, Debug)]
struct SparseInput {
    dims: Vec<u8>,
    values: Vec<u16>,
    indices: Vec<i64>,
    coordinate_form: bool,
}

fuzz_target!(|input: SparseInput| {
    let dims: Vec<i64> = input.dims.iter().take(3).map(|&d| i64::from(d % 16)).collect();
    let nnz = input.values.len().min(64);
    let rank = if input.coordinate_form { dims.len().max(1) } else { 1 };
    let indices: Vec<u8> = input.indices.iter().take(nnz * rank).flat_map(|i| i.to_le_bytes()).collect();
    let index_dims = if input.coordinate_form { vec![nnz as i64, rank as i64] } else { vec![nnz as i64] };

    let sparse = SparseTensorDescriptor {
        values: TensorDescriptor::new("v", ElementType::Uint16, [nnz as i64])
            .with_raw(input.values[..nnz].iter().flat_map(|v| v.to_le_bytes()).collect()),
        indices: TensorDescriptor::new("i", ElementType::Int64, index_dims).with_raw(indices),
        dims,
    };
    let codec = TensorCodec::default();

    // Invariant: every expanded tensor converts back without error and keeps
    // no more non-zero entries than were provided.
    if let Ok(dense) = sparse_to_dense(&codec, &sparse) {
        let back = dense_to_sparse(&codec, &dense).expect("dense tensor converts back");
        assert!(back.values.dims[0] as usize <= nnz);
        assert_eq!(back.dims, sparse.dims);
    }
});
