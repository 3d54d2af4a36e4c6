//! Descriptor ↔ tensor conversion.
//!
//! Decoding dispatches on the payload form. Raw and external bytes are
//! little-endian and go through an endianness-aware copy; typed fields are
//! narrowed value by value according to the element type's [`TypeInfo`].
//! Packed 4-bit types move whole pairs and never convert per element.
//!
//! Decoded bytes are in the codec's host order ([`TensorCodec::endian`]).

use std::path::{Path, PathBuf};

use tensorpack_common::endian::{self, read_little_endian, write_little_endian};
use tensorpack_common::{
    CodecConfig, Element, ElementType, Endian, FieldConversion, Result, Tensor, TensorData, TensorPackError,
    TypeInfo, size,
};
use tracing::debug;

use crate::descriptor::{TensorDescriptor, TensorPayload, TypedData};
use crate::env::{DefaultEnv, Env, ExternalBytes};
use crate::external::{
    ExternalDataInfo, LoadedExternal, ResolvedSource, load_file_region, resolve_external_data,
};

/// Converts between [`TensorDescriptor`]s and in-memory data.
#[derive(Debug, Clone)]
pub struct TensorCodec<E: Env = DefaultEnv> {
    env: E,
    config: CodecConfig,
    endian: Endian,
    base_dir: PathBuf,
    in_process_refs: bool,
}

impl Default for TensorCodec<DefaultEnv> {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

impl TensorCodec<DefaultEnv> {
    pub fn new(config: CodecConfig) -> Self {
        Self::with_env(DefaultEnv, config)
    }
}

impl<E: Env> TensorCodec<E> {
    pub fn with_env(env: E, config: CodecConfig) -> Self {
        Self { env, config, endian: Endian::native(), base_dir: PathBuf::new(), in_process_refs: false }
    }

    /// Accept descriptors whose external reference points into process
    /// memory. Without this, decoding such a descriptor is an error.
    ///
    /// # Safety
    ///
    /// For as long as this codec decodes descriptors, every in-process
    /// reference it is given must name `length` readable bytes that stay
    /// alive and unmodified for the duration of the call, as produced by
    /// [`tensor_to_descriptor`](Self::tensor_to_descriptor) from a tensor
    /// that is still alive. Descriptors parsed from files or other outside
    /// input must not reach a codec with this enabled.
    #[must_use]
    pub unsafe fn allow_in_process_refs(mut self) -> Self {
        self.in_process_refs = true;
        self
    }

    pub fn in_process_refs_allowed(&self) -> bool {
        self.in_process_refs
    }

    /// Directory that relative external locations are resolved against.
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Override the host byte order. Typed views (`unpack::<T>`) assume the
    /// native order, so a non-native setting is only meaningful for the
    /// byte-level operations.
    #[must_use]
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    // ── Decoding ────────────────────────────────────────────────────

    /// Decode `expected` logical elements of `desc` into `dst`.
    ///
    /// For packed 4-bit types `dst` holds pairs and must have room for
    /// `ceil(expected / 2)` of them. An empty `dst` is accepted when the
    /// descriptor carries no data.
    pub fn unpack<T: Element>(&self, desc: &TensorDescriptor, dst: &mut [T], expected: usize) -> Result<()> {
        if dst.is_empty() {
            return self.check_empty_source(desc);
        }
        if desc.data_type != T::ELEMENT_TYPE {
            return Err(TensorPackError::TypeMismatch { expected: T::ELEMENT_TYPE, actual: desc.data_type });
        }
        let info = type_info(desc.data_type)?;
        let units = units_for(&info, expected);
        if dst.len() < units {
            return Err(TensorPackError::invalid(format!(
                "destination for '{}' holds {} elements, {units} required",
                desc.name,
                dst.len()
            )));
        }
        let dst = &mut dst[..units];
        match T::as_bytes_mut(dst) {
            Some(bytes) => self.decode_bytes(desc, &info, expected, bytes),
            None => {
                let mut scratch = vec![0u8; std::mem::size_of_val(dst)];
                self.decode_bytes(desc, &info, expected, &mut scratch)?;
                T::read_bytes(&scratch, dst);
                Ok(())
            }
        }
    }

    /// Decode a string tensor. Each string is cloned into `dst`.
    pub fn unpack_strings(&self, desc: &TensorDescriptor, dst: &mut [String], expected: usize) -> Result<()> {
        if dst.is_empty() {
            return self.check_empty_source(desc);
        }
        if desc.data_type != ElementType::String {
            return Err(TensorPackError::TypeMismatch { expected: ElementType::String, actual: desc.data_type });
        }
        desc.check_payload_form()?;
        let strings: &[String] = match &desc.payload {
            TensorPayload::Typed(TypedData::String(s)) => s,
            TensorPayload::Empty => &[],
            TensorPayload::Typed(other) => {
                return Err(TensorPackError::invalid(format!(
                    "string tensor '{}' carries {} instead of string_data",
                    desc.name,
                    other.field()
                )));
            }
            TensorPayload::Raw(_) | TensorPayload::External(_) => {
                return Err(TensorPackError::invalid(format!(
                    "invalid payload form for string tensor '{}'",
                    desc.name
                )));
            }
        };
        if strings.len() != expected {
            return Err(TensorPackError::DataCorruption {
                name: desc.name.clone(),
                expected,
                actual: strings.len(),
            });
        }
        if dst.len() < expected {
            return Err(TensorPackError::invalid(format!(
                "destination for '{}' holds {} strings, {expected} required",
                desc.name,
                dst.len()
            )));
        }
        dst[..expected].clone_from_slice(strings);
        Ok(())
    }

    /// Decode any non-string descriptor into host-order bytes, sizing the
    /// output from the payload itself.
    pub fn unpack_initializer_data(&self, desc: &TensorDescriptor) -> Result<Vec<u8>> {
        if desc.data_type.is_string() {
            return Err(TensorPackError::invalid(format!("Unsupported type: {}", desc.data_type)));
        }
        let info = type_info(desc.data_type)?;

        let expected = match &desc.payload {
            TensorPayload::External(_) => {
                let resolved = resolve_external_data(desc, &self.base_dir)?;
                return self.read_external_host_order(desc, &info, &resolved.source, resolved.byte_length);
            }
            _ if info.packed => desc.element_count()?,
            TensorPayload::Raw(raw) => raw.len() / info.byte_width,
            TensorPayload::Typed(t) => t.len(),
            TensorPayload::Empty => 0,
        };
        let len = size::byte_size_for_count(expected, desc.data_type, 0)?;
        let mut out = vec![0u8; len];
        self.decode_bytes(desc, &info, expected, &mut out)?;
        Ok(out)
    }

    /// Materialize `desc` into a freshly allocated tensor.
    pub fn descriptor_to_tensor(&self, desc: &TensorDescriptor) -> Result<Tensor> {
        reject_negative_dims(desc)?;
        desc.check_payload_form()?;
        let count = desc.element_count()?;

        if desc.data_type.is_string() {
            let mut strings = vec![String::new(); count];
            self.unpack_strings(desc, &mut strings, count)?;
            return Tensor::from_strings(desc.dims.clone(), strings);
        }

        let info = type_info(desc.data_type)?;
        let mut bytes = vec![0u8; desc.byte_size(0)?];
        self.decode_bytes(desc, &info, count, &mut bytes)?;
        Tensor::from_bytes(desc.data_type, desc.dims.clone(), bytes)
    }

    /// Materialize `desc` into a caller-provided buffer, such as a planner
    /// sub-buffer. Returns the number of bytes written.
    pub fn descriptor_into_buffer(&self, desc: &TensorDescriptor, buf: &mut [u8]) -> Result<usize> {
        reject_negative_dims(desc)?;
        if desc.data_type.is_string() {
            return Err(TensorPackError::invalid(format!(
                "string tensor '{}' cannot be placed in a preallocated buffer",
                desc.name
            )));
        }
        let info = type_info(desc.data_type)?;
        let required = desc.byte_size(0)?;
        if required > buf.len() {
            return Err(TensorPackError::invalid(format!(
                "The preallocated buffer is too small. Requires {required}, Got {}",
                buf.len()
            )));
        }
        let count = desc.element_count()?;
        self.decode_bytes(desc, &info, count, &mut buf[..required])?;
        Ok(required)
    }

    // ── Encoding ────────────────────────────────────────────────────

    /// Build a descriptor for `tensor`.
    ///
    /// With `use_tensor_buffer`, tensors larger than the configured
    /// small-tensor threshold are referenced in place through an in-process
    /// external reference instead of copied. The descriptor is then only
    /// valid while `tensor` is alive and unmoved.
    pub fn tensor_to_descriptor(
        &self,
        tensor: &Tensor,
        name: &str,
        use_tensor_buffer: bool,
    ) -> Result<TensorDescriptor> {
        let dims = tensor.shape().dims().to_vec();
        let desc = TensorDescriptor::new(name, tensor.element_type(), dims);

        match tensor.data() {
            TensorData::Strings(strings) => Ok(desc.with_typed(TypedData::String(strings.clone()))),
            TensorData::Bytes(bytes) => {
                let size = bytes.len();
                if use_tensor_buffer && size as u64 > self.config.small_tensor_threshold {
                    debug!(name, size, "packing tensor as in-process reference");
                    let address = bytes.as_ptr() as usize;
                    if i64::try_from(address).is_err() {
                        return Err(TensorPackError::invalid(format!(
                            "address of '{name}' does not fit in a signed 64-bit offset"
                        )));
                    }
                    return Ok(desc.with_external(ExternalDataInfo::in_process(address, size)));
                }
                let info = type_info(tensor.element_type())?;
                let mut raw = vec![0u8; size];
                write_little_endian(self.endian, info.byte_width, bytes, &mut raw)?;
                Ok(desc.with_raw(raw))
            }
        }
    }

    // ── External data ───────────────────────────────────────────────

    /// Load the bytes referenced by an external descriptor, along with any
    /// pre-packed blobs. File data is returned as stored (little-endian);
    /// in-process data is copied in host order.
    pub fn load_external(&self, desc: &TensorDescriptor) -> Result<LoadedExternal> {
        let resolved = resolve_external_data(desc, &self.base_dir)?;
        match &resolved.source {
            ResolvedSource::File { path, offset } => {
                load_file_region(&self.env, &desc.name, path, *offset, &resolved, self.config.use_mmap)
            }
            ResolvedSource::InProcess { address } => {
                let bytes = self.in_process_bytes(&desc.name, *address, resolved.byte_length)?;
                Ok(LoadedExternal {
                    bytes: ExternalBytes::Owned(bytes.to_vec()),
                    prepacked: Default::default(),
                })
            }
        }
    }

    /// Equivalent descriptor carrying the external bytes inline as raw data.
    pub fn external_to_inline(&self, desc: &TensorDescriptor) -> Result<TensorDescriptor> {
        let resolved = resolve_external_data(desc, &self.base_dir)?;
        let raw = match &resolved.source {
            ResolvedSource::File { .. } => self.load_external(desc)?.bytes.into_vec(),
            ResolvedSource::InProcess { address } => {
                let info = type_info(desc.data_type)?;
                let host = self.in_process_bytes(&desc.name, *address, resolved.byte_length)?;
                let mut raw = vec![0u8; host.len()];
                write_little_endian(self.endian, info.byte_width, host, &mut raw)?;
                raw
            }
        };
        Ok(TensorDescriptor::new(desc.name.clone(), desc.data_type, desc.dims.clone()).with_raw(raw))
    }

    /// Inline `desc` if its external reference points into process memory.
    pub fn in_memory_to_inline(&self, desc: &TensorDescriptor) -> Result<Option<TensorDescriptor>> {
        if desc.has_external_data_in_memory() {
            self.external_to_inline(desc).map(Some)
        } else {
            Ok(None)
        }
    }

    fn in_process_bytes(&self, name: &str, address: usize, length: usize) -> Result<&[u8]> {
        if !self.in_process_refs {
            return Err(TensorPackError::invalid(format!(
                "tensor '{name}' references process memory but in-process references are disabled"
            )));
        }
        if length == 0 {
            return Ok(&[]);
        }
        if address == 0 {
            return Err(TensorPackError::invalid(format!("tensor '{name}' references a null address")));
        }
        // SAFETY: `in_process_refs` is only set through the unsafe
        // `allow_in_process_refs`, whose caller guarantees that `address`
        // names `length` live, unmodified bytes for this call.
        Ok(unsafe { std::slice::from_raw_parts(address as *const u8, length) })
    }

    fn read_external_host_order(
        &self,
        desc: &TensorDescriptor,
        info: &TypeInfo,
        source: &ResolvedSource,
        byte_length: usize,
    ) -> Result<Vec<u8>> {
        match source {
            ResolvedSource::File { .. } => {
                let loaded = self.load_external(desc)?;
                let mut out = vec![0u8; loaded.bytes.len()];
                read_little_endian(self.endian, info.byte_width, &loaded.bytes, &mut out)?;
                Ok(out)
            }
            ResolvedSource::InProcess { address } => {
                Ok(self.in_process_bytes(&desc.name, *address, byte_length)?.to_vec())
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn check_empty_source(&self, desc: &TensorDescriptor) -> Result<()> {
        let source_len = match &desc.payload {
            TensorPayload::Empty => 0,
            TensorPayload::Raw(raw) => raw.len(),
            TensorPayload::Typed(t) => t.len(),
            TensorPayload::External(_) => desc.byte_size(0)?,
        };
        if source_len == 0 {
            Ok(())
        } else {
            Err(TensorPackError::invalid(format!(
                "destination for '{}' is empty but the descriptor carries {source_len} source entries",
                desc.name
            )))
        }
    }

    /// Decode into `dst`, which holds exactly the units implied by `expected`.
    fn decode_bytes(
        &self,
        desc: &TensorDescriptor,
        info: &TypeInfo,
        expected: usize,
        dst: &mut [u8],
    ) -> Result<()> {
        match &desc.payload {
            TensorPayload::Raw(raw) => {
                debug!(name = %desc.name, len = raw.len(), "decoding raw data");
                self.decode_raw(desc, info, raw, expected, dst)
            }
            TensorPayload::External(_) => {
                let resolved = resolve_external_data(desc, &self.base_dir)?;
                match &resolved.source {
                    ResolvedSource::File { .. } => {
                        let loaded = self.load_external(desc)?;
                        debug!(name = %desc.name, mapped = loaded.bytes.is_mapped(), "decoding external data");
                        self.decode_raw(desc, info, &loaded.bytes, expected, dst)
                    }
                    ResolvedSource::InProcess { address } => {
                        let host = self.in_process_bytes(&desc.name, *address, resolved.byte_length)?;
                        check_raw_len(desc, info, host.len(), expected)?;
                        dst.copy_from_slice(host);
                        Ok(())
                    }
                }
            }
            TensorPayload::Typed(data) => {
                debug!(name = %desc.name, field = %data.field(), "decoding typed field");
                self.decode_typed(desc, info, Some(data), expected, dst)
            }
            TensorPayload::Empty => self.decode_typed(desc, info, None, expected, dst),
        }
    }

    fn decode_raw(
        &self,
        desc: &TensorDescriptor,
        info: &TypeInfo,
        raw: &[u8],
        expected: usize,
        dst: &mut [u8],
    ) -> Result<()> {
        check_raw_len(desc, info, raw.len(), expected)?;
        read_little_endian(self.endian, info.byte_width, raw, dst)
    }

    fn decode_typed(
        &self,
        desc: &TensorDescriptor,
        info: &TypeInfo,
        data: Option<&TypedData>,
        expected: usize,
        dst: &mut [u8],
    ) -> Result<()> {
        let units = units_for(info, expected);
        let actual = data.map_or(0, TypedData::len);
        if let Some(data) = data.filter(|d| d.field() != info.field) {
            return Err(TensorPackError::invalid(format!(
                "tensor '{}' of type {} carries {}, expected {}",
                desc.name,
                desc.data_type,
                data.field(),
                info.field
            )));
        }
        if actual != units {
            return Err(TensorPackError::DataCorruption { name: desc.name.clone(), expected: units, actual });
        }
        let Some(data) = data else {
            return Ok(());
        };

        let endian = self.endian;
        let chunks = dst.chunks_exact_mut(info.byte_width);
        match data {
            TypedData::Float(v) => {
                chunks.zip(v).for_each(|(c, x)| write_unit(c, u64::from(x.to_bits()), endian));
            }
            TypedData::Double(v) => chunks.zip(v).for_each(|(c, x)| write_unit(c, x.to_bits(), endian)),
            TypedData::Int64(v) => chunks.zip(v).for_each(|(c, x)| write_unit(c, *x as u64, endian)),
            TypedData::Uint64(v) => chunks.zip(v).for_each(|(c, x)| write_unit(c, *x, endian)),
            TypedData::Int32(v) => {
                for (c, x) in chunks.zip(v) {
                    write_unit(c, narrow_int32(*x, info.conversion)?, endian);
                }
            }
            TypedData::String(_) => {
                return Err(TensorPackError::invalid(format!(
                    "string_data cannot be decoded as {}",
                    desc.data_type
                )));
            }
        }
        Ok(())
    }
}

// ── Byte order conversion ───────────────────────────────────────────

/// Swap a descriptor's inline data between host and wire byte order.
///
/// Raw bytes are swapped per logical element. Typed fields are swapped per
/// container slot, so 16-bit types held in `int32_data` swap all four bytes
/// and `uint32` held in `uint64_data` swaps eight. Single-byte types are
/// left untouched.
pub fn convert_raw_data_in_place(desc: &mut TensorDescriptor) -> Result<()> {
    let Some(info) = desc.data_type.info() else {
        return Ok(());
    };
    if info.byte_width == 1 || info.packed || info.swap_width == 0 {
        return Ok(());
    }
    match &mut desc.payload {
        TensorPayload::Raw(raw) => endian::swap_byte_order_in_place(info.byte_width, raw),
        TensorPayload::Typed(data) => {
            match data {
                TypedData::Float(v) => v.iter_mut().for_each(|x| *x = f32::from_bits(x.to_bits().swap_bytes())),
                TypedData::Double(v) => v.iter_mut().for_each(|x| *x = f64::from_bits(x.to_bits().swap_bytes())),
                TypedData::Int32(v) => v.iter_mut().for_each(|x| *x = x.swap_bytes()),
                TypedData::Int64(v) => v.iter_mut().for_each(|x| *x = x.swap_bytes()),
                TypedData::Uint64(v) => v.iter_mut().for_each(|x| *x = x.swap_bytes()),
                TypedData::String(_) => {}
            }
            Ok(())
        }
        TensorPayload::Empty | TensorPayload::External(_) => Ok(()),
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn type_info(ty: ElementType) -> Result<TypeInfo> {
    ty.info().ok_or_else(|| TensorPackError::NotImplemented(format!("element type {ty}")))
}

fn units_for(info: &TypeInfo, expected: usize) -> usize {
    if info.packed { size::calc_num_int4_pairs(expected) } else { expected }
}

fn reject_negative_dims(desc: &TensorDescriptor) -> Result<()> {
    if desc.dims.iter().any(|&d| d < 0) {
        return Err(TensorPackError::invalid(format!("tensor '{}' can't contain negative dims", desc.name)));
    }
    Ok(())
}

fn check_raw_len(desc: &TensorDescriptor, info: &TypeInfo, actual: usize, expected: usize) -> Result<()> {
    let units = units_for(info, expected);
    if info.packed {
        if actual != units {
            return Err(TensorPackError::invalid(format!(
                "Unexpected number of packed int4 pairs in '{}': expected {units}, got {actual}",
                desc.name
            )));
        }
        return Ok(());
    }
    let expected_bytes = units
        .checked_mul(info.byte_width)
        .ok_or_else(|| TensorPackError::overflow(format!("raw size of '{}'", desc.name)))?;
    if actual != expected_bytes {
        return Err(TensorPackError::invalid(format!(
            "raw data size of '{}' does not match its shape, expected {expected_bytes}, got {actual}",
            desc.name
        )));
    }
    Ok(())
}

fn narrow_int32(v: i32, conversion: FieldConversion) -> Result<u64> {
    match conversion {
        FieldConversion::Cast => Ok(i64::from(v) as u64),
        FieldConversion::Truthy => Ok(u64::from(v != 0)),
        FieldConversion::Bits(bits) => {
            let max = (1i64 << bits) - 1;
            if v < 0 || i64::from(v) > max {
                return Err(TensorPackError::DataOverflow { value: i64::from(v), bits });
            }
            Ok(v as u64)
        }
    }
}

/// Store the low `dst.len()` bytes of `bits` in `endian` order.
fn write_unit(dst: &mut [u8], bits: u64, endian: Endian) {
    let w = dst.len();
    match endian {
        Endian::Little => dst.copy_from_slice(&bits.to_le_bytes()[..w]),
        Endian::Big => dst.copy_from_slice(&bits.to_be_bytes()[8 - w..]),
    }
}
