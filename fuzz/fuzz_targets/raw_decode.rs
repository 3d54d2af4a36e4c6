#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tensorpack::{ElementType, Endian, TensorCodec, TensorDescriptor};

#[derive(Arbitrary, Debug)]
struct RawInput {
    data_type: u8,
    dims: Vec<u8>,
    big_endian: bool,
    raw: Vec<u8>,
}

fuzz_target!(|input: RawInput| {
    let Some(ty) = ElementType::from_i32(i32::from(input.data_type % 23)) else {
        return;
    };
    // Cap rank at 4 and each dim at 32 to keep allocations small.
    let dims: Vec<i64> = input.dims.iter().take(4).map(|&d| i64::from(d % 32)).collect();
    let desc = TensorDescriptor::new("fuzz", ty, dims).with_raw(input.raw.clone());
    let endian = if input.big_endian { Endian::Big } else { Endian::Little };
    let codec = TensorCodec::default().with_endian(endian);

    // Invariant: a successful decode re-encodes to the exact input bytes.
    if let Ok(tensor) = codec.descriptor_to_tensor(&desc) {
        let packed = codec.tensor_to_descriptor(&tensor, "fuzz", false).expect("re-encode");
        assert_eq!(packed.raw_data(), Some(input.raw.as_slice()), "raw round trip changed bytes");
    }
});
