//! Contiguous particle record storage with amortized growth.
//!
//! Records live back to back in one byte buffer. Indices `[0, len)` are live;
//! slots in `[len, capacity)` are zeroed and meaningless. The logical capacity
//! only changes through [`ParticleStore::realloc`] (or [`ParticleStore::push_slot`]
//! when the store is full), using a delta recomputed from the live count on
//! every call.

use std::ops::Range;

use bytemuck::Pod;

use crate::error::{Result, SwarmError};
use crate::record::{FieldSpec, RecordSchema};
use crate::{CellIndex, Coord, ParticleIndex};

/// Store growth policy: `delta = max(minimum_delta, count * extra_factor)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthPolicy {
    /// Fraction of the live count added as headroom on growth
    pub extra_factor: f64,
    /// Floor on the delta
    pub minimum_delta: usize,
}

impl GrowthPolicy {
    /// Create a policy, rejecting a non-positive factor or zero floor.
    pub fn new(extra_factor: f64, minimum_delta: usize) -> Result<Self> {
        if !(extra_factor > 0.0) || !extra_factor.is_finite() {
            return Err(SwarmError::InvalidConfig(format!(
                "extra_particles_factor must be a positive finite number, got {extra_factor}"
            )));
        }
        if minimum_delta == 0 {
            return Err(SwarmError::InvalidConfig(
                "minimum_particles_delta must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            extra_factor,
            minimum_delta,
        })
    }

    /// Delta for the given live count.
    pub fn delta_for(&self, count: usize) -> usize {
        let proportional = (count as f64 * self.extra_factor) as usize;
        proportional.max(self.minimum_delta)
    }
}

/// Outcome of a [`ParticleStore::realloc`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Realloc {
    /// Capacity left as is
    Unchanged,
    /// Capacity raised to `count + delta`
    Grew { from: usize, to: usize },
    /// Capacity dropped to exactly `count`
    Shrank { from: usize, to: usize },
}

/// Growable array of fixed-size particle records.
#[derive(Debug, Clone)]
pub struct ParticleStore {
    schema: RecordSchema,
    policy: GrowthPolicy,
    record_size: usize,
    /// `capacity * record_size` bytes.
    data: Vec<u8>,
    count: usize,
    capacity: usize,
}

impl ParticleStore {
    /// Create an empty store with zero capacity.
    pub fn new(schema: RecordSchema, policy: GrowthPolicy) -> Self {
        let record_size = schema.record_size();
        Self {
            schema,
            policy,
            record_size,
            data: Vec::new(),
            count: 0,
            capacity: 0,
        }
    }

    /// Replace the growth policy. Takes effect at the next reallocation.
    pub fn set_policy(&mut self, policy: GrowthPolicy) {
        self.policy = policy;
    }

    /// Record layout.
    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Growth policy.
    pub fn policy(&self) -> GrowthPolicy {
        self.policy
    }

    /// Number of live particles.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Return `true` if no particle is live.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of allocated record slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes per record.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Current growth delta for the live count.
    pub fn delta(&self) -> usize {
        self.policy.delta_for(self.count)
    }

    #[inline]
    fn span(&self, index: ParticleIndex) -> std::ops::Range<usize> {
        let start = index * self.record_size;
        start..start + self.record_size
    }

    fn check(&self, index: ParticleIndex) -> Result<()> {
        if index < self.count {
            Ok(())
        } else {
            Err(SwarmError::ParticleOutOfRange {
                index,
                count: self.count,
            })
        }
    }

    /// Raw bytes of a live record.
    pub fn record(&self, index: ParticleIndex) -> Result<&[u8]> {
        self.check(index)?;
        Ok(&self.data[self.span(index)])
    }

    /// Mutable raw bytes of a live record.
    pub fn record_mut(&mut self, index: ParticleIndex) -> Result<&mut [u8]> {
        self.check(index)?;
        let span = self.span(index);
        Ok(&mut self.data[span])
    }

    /// Coordinate of a live particle; unused trailing components are zero.
    pub fn coord(&self, index: ParticleIndex) -> Result<Coord> {
        let bytes = self.record(index)?;
        Ok(read_coord(&self.schema, bytes))
    }

    /// Overwrite the coordinate of a live particle. Only the first `dim`
    /// components of `coord` are used.
    pub fn set_coord(&mut self, index: ParticleIndex, coord: &[f64]) -> Result<()> {
        let dim = self.schema.dim();
        if coord.len() < dim {
            return Err(SwarmError::InvalidConfig(format!(
                "coordinate has {} components, swarm dimension is {dim}",
                coord.len()
            )));
        }
        let offset = self.schema.coord_offset();
        let bytes = self.record_mut(index)?;
        for (axis, value) in coord.iter().take(dim).enumerate() {
            let at = offset + axis * 8;
            bytes[at..at + 8].copy_from_slice(bytemuck::bytes_of(value));
        }
        Ok(())
    }

    /// Owning cell of a live particle.
    pub fn owning_cell(&self, index: ParticleIndex) -> Result<CellIndex> {
        let bytes = self.record(index)?;
        Ok(read_owning_cell(&self.schema, bytes))
    }

    /// Overwrite the owning cell of a live particle.
    pub fn set_owning_cell(&mut self, index: ParticleIndex, cell: CellIndex) -> Result<()> {
        let offset = self.schema.owning_cell_offset();
        let bytes = self.record_mut(index)?;
        bytes[offset..offset + 4].copy_from_slice(bytemuck::bytes_of(&cell));
        Ok(())
    }

    /// Read one component of a typed field.
    pub fn read_field<T: Pod>(
        &self,
        index: ParticleIndex,
        field: &FieldSpec,
        component: usize,
    ) -> Result<T> {
        let span = self.field_span::<T>(field, component)?;
        let bytes = self.record(index)?;
        Ok(bytemuck::pod_read_unaligned(&bytes[span]))
    }

    /// Write one component of a typed field.
    pub fn write_field<T: Pod>(
        &mut self,
        index: ParticleIndex,
        field: &FieldSpec,
        component: usize,
        value: T,
    ) -> Result<()> {
        let span = self.field_span::<T>(field, component)?;
        let bytes = self.record_mut(index)?;
        bytes[span].copy_from_slice(bytemuck::bytes_of(&value));
        Ok(())
    }

    /// Byte range of one component of `field`, checked against the field's
    /// component count, its scalar width and this store's record size.
    fn field_span<T: Pod>(&self, field: &FieldSpec, component: usize) -> Result<Range<usize>> {
        let width = std::mem::size_of::<T>();
        if width != field.kind.size() {
            return Err(SwarmError::InvalidConfig(format!(
                "field '{}' holds {:?} components, not {width}-byte values",
                field.name, field.kind
            )));
        }
        let at = field.component_offset(component).ok_or_else(|| {
            SwarmError::InvalidConfig(format!(
                "field '{}' has {} components, no component {component}",
                field.name, field.components
            ))
        })?;
        if at + width > self.record_size {
            return Err(SwarmError::InvalidConfig(format!(
                "field '{}' does not fit a {}-byte record",
                field.name, self.record_size
            )));
        }
        Ok(at..at + width)
    }

    /// Append a zeroed slot at `len`, growing by one delta if the store is full.
    /// The slot is live on return.
    pub fn push_slot(&mut self) -> ParticleIndex {
        if self.count == self.capacity {
            let delta = self.delta();
            tracing::trace!(
                "particle store full at {} records, growing by {}",
                self.capacity,
                delta
            );
            self.resize_capacity(self.capacity + delta);
        }
        let index = self.count;
        self.count += 1;
        let span = self.span(index);
        self.data[span].fill(0);
        index
    }

    /// Overwrite a live slot with a full record.
    pub fn write_record(&mut self, index: ParticleIndex, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.record_size {
            return Err(SwarmError::InvalidConfig(format!(
                "record is {} bytes, store records are {} bytes",
                bytes.len(),
                self.record_size
            )));
        }
        self.record_mut(index)?.copy_from_slice(bytes);
        Ok(())
    }

    /// Copy record `src` over record `dst`. Both must be live.
    pub fn copy_within(&mut self, src: ParticleIndex, dst: ParticleIndex) -> Result<()> {
        self.check(src)?;
        self.check(dst)?;
        if src != dst {
            let from = self.span(src);
            self.data.copy_within(from, dst * self.record_size);
        }
        Ok(())
    }

    /// Drop every record at or beyond `new_len`, zeroing their bytes.
    /// Capacity is untouched; call [`ParticleStore::realloc`] afterwards.
    pub fn truncate(&mut self, new_len: usize) {
        if new_len >= self.count {
            return;
        }
        let start = new_len * self.record_size;
        let end = self.count * self.record_size;
        self.data[start..end].fill(0);
        self.count = new_len;
    }

    /// Bump the live count by one without touching capacity, then apply the
    /// growth policy. Used by particle creation.
    pub fn extend_one(&mut self) -> ParticleIndex {
        let index = self.count;
        self.count += 1;
        self.realloc();
        let span = self.span(index);
        self.data[span].fill(0);
        index
    }

    /// Apply the store's reallocation policy once.
    ///
    /// With `delta` computed from the current count: shrink to exactly
    /// `count` if `count <= capacity - delta`; grow to `count + delta` if
    /// `count >= capacity`; otherwise leave the capacity alone.
    pub fn realloc(&mut self) -> Realloc {
        let delta = self.delta();
        let from = self.capacity;
        if self.capacity >= delta && self.count <= self.capacity - delta {
            self.resize_capacity(self.count);
            tracing::trace!("particle store shrank from {} to {}", from, self.capacity);
            Realloc::Shrank {
                from,
                to: self.capacity,
            }
        } else if self.count >= self.capacity {
            self.resize_capacity(self.count + delta);
            tracing::trace!("particle store grew from {} to {}", from, self.capacity);
            Realloc::Grew {
                from,
                to: self.capacity,
            }
        } else {
            Realloc::Unchanged
        }
    }

    fn resize_capacity(&mut self, capacity: usize) {
        self.data.resize(capacity * self.record_size, 0);
        if capacity < self.capacity {
            self.data.shrink_to_fit();
        }
        self.capacity = capacity;
    }
}

/// Decode the coordinate field from raw record bytes.
pub fn read_coord(schema: &RecordSchema, bytes: &[u8]) -> Coord {
    let offset = schema.coord_offset();
    let mut coord = [0.0; 3];
    for (axis, value) in coord.iter_mut().take(schema.dim()).enumerate() {
        let at = offset + axis * 8;
        *value = bytemuck::pod_read_unaligned(&bytes[at..at + 8]);
    }
    coord
}

/// Decode the owning-cell field from raw record bytes.
pub fn read_owning_cell(schema: &RecordSchema, bytes: &[u8]) -> CellIndex {
    let at = schema.owning_cell_offset();
    bytemuck::pod_read_unaligned(&bytes[at..at + 4])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldKind;

    fn store() -> ParticleStore {
        let schema = RecordSchema::new(3).unwrap();
        ParticleStore::new(schema, GrowthPolicy::new(0.05, 100).unwrap())
    }

    #[test]
    fn policy_rejects_non_positive_factor() {
        assert!(GrowthPolicy::new(0.0, 100).is_err());
        assert!(GrowthPolicy::new(-0.5, 100).is_err());
        assert!(GrowthPolicy::new(f64::NAN, 100).is_err());
        assert!(GrowthPolicy::new(0.05, 0).is_err());
    }

    #[test]
    fn delta_has_floor() {
        let policy = GrowthPolicy::new(0.05, 100).unwrap();
        assert_eq!(policy.delta_for(0), 100);
        assert_eq!(policy.delta_for(1999), 100);
        assert_eq!(policy.delta_for(4000), 200);
    }

    #[test]
    fn growth_jumps_when_count_reaches_capacity() {
        let mut s = store();
        let mut jumps = Vec::new();
        let mut prev_capacity = s.capacity();
        for _ in 0..5000 {
            let count_before = s.len();
            s.extend_one();
            if s.capacity() != prev_capacity {
                // jumps happen exactly when the new count reaches the old capacity
                assert_eq!(s.len(), prev_capacity.max(count_before + 1));
                assert_eq!(s.capacity(), s.len() + s.policy().delta_for(s.len()));
                jumps.push((s.len(), s.capacity()));
                prev_capacity = s.capacity();
            }
        }
        assert_eq!(jumps[0], (1, 101));
        assert_eq!(jumps[1], (101, 201));
        // above 2000 live records the proportional delta dominates
        let late = jumps.iter().find(|(count, _)| *count > 3000).unwrap();
        assert_eq!(late.1 - late.0, (late.0 as f64 * 0.05) as usize);
    }

    #[test]
    fn realloc_shrinks_after_mass_delete() {
        let mut s = store();
        for _ in 0..300 {
            s.extend_one();
        }
        let capacity = s.capacity();
        assert!(capacity >= 300);
        s.truncate(50);
        assert_eq!(
            s.realloc(),
            Realloc::Shrank {
                from: capacity,
                to: 50
            }
        );
        assert_eq!(s.capacity(), 50);
    }

    #[test]
    fn realloc_within_band_is_noop() {
        let mut s = store();
        for _ in 0..150 {
            s.extend_one();
        }
        // capacity 201 after the second jump; 150 is inside (101, 201)
        assert_eq!(s.capacity(), 201);
        assert_eq!(s.realloc(), Realloc::Unchanged);
    }

    #[test]
    fn coord_and_owning_cell_roundtrip_through_bytes() {
        let mut s = store();
        let i = s.extend_one();
        s.set_coord(i, &[0.25, -1.5, 3.0]).unwrap();
        s.set_owning_cell(i, 17).unwrap();
        assert_eq!(s.coord(i).unwrap(), [0.25, -1.5, 3.0]);
        assert_eq!(s.owning_cell(i).unwrap(), 17);
    }

    #[test]
    fn extension_field_access() {
        let schema = RecordSchema::new(2)
            .unwrap()
            .with_field("material", FieldKind::I32, 1)
            .unwrap();
        let material = schema.field("material").unwrap().clone();
        let mut s = ParticleStore::new(schema, GrowthPolicy::new(0.05, 10).unwrap());
        let i = s.extend_one();
        s.write_field(i, &material, 0, -3_i32).unwrap();
        assert_eq!(s.read_field::<i32>(i, &material, 0).unwrap(), -3);
    }

    #[test]
    fn field_access_past_last_component_is_error() {
        let schema = RecordSchema::new(2)
            .unwrap()
            .with_field("material", FieldKind::U32, 1)
            .unwrap();
        let material = schema.field("material").unwrap().clone();
        let coord = schema.field(crate::record::COORD_FIELD).unwrap().clone();
        let mut s = ParticleStore::new(schema, GrowthPolicy::new(0.05, 10).unwrap());
        let i = s.extend_one();
        s.set_owning_cell(i, 5).unwrap();

        assert!(matches!(
            s.read_field::<u32>(i, &material, 3),
            Err(SwarmError::InvalidConfig(_))
        ));
        // a third coordinate component would land on the owning cell
        assert!(matches!(
            s.write_field(i, &coord, 2, 7.0_f64),
            Err(SwarmError::InvalidConfig(_))
        ));
        assert_eq!(s.owning_cell(i).unwrap(), 5);
    }

    #[test]
    fn field_access_with_wrong_width_is_error() {
        let schema = RecordSchema::new(2)
            .unwrap()
            .with_field("material", FieldKind::U32, 1)
            .unwrap();
        let material = schema.field("material").unwrap().clone();
        let mut s = ParticleStore::new(schema, GrowthPolicy::new(0.05, 10).unwrap());
        let i = s.extend_one();
        assert!(matches!(
            s.write_field(i, &material, 0, 1_u64),
            Err(SwarmError::InvalidConfig(_))
        ));
        assert!(s.read_field::<f64>(i, &material, 0).is_err());
    }

    #[test]
    fn field_from_a_larger_schema_is_rejected() {
        let wide = RecordSchema::new(3)
            .unwrap()
            .with_field("velocity", FieldKind::F64, 3)
            .unwrap();
        let velocity = wide.field("velocity").unwrap().clone();
        let mut s = store();
        let i = s.extend_one();
        assert!(s.read_field::<f64>(i, &velocity, 2).is_err());
    }

    #[test]
    fn out_of_range_access_is_error() {
        let mut s = store();
        s.extend_one();
        assert!(matches!(
            s.coord(1),
            Err(SwarmError::ParticleOutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn push_slot_grows_by_delta_when_full() {
        let mut s = store();
        for _ in 0..101 {
            s.extend_one();
        }
        assert_eq!(s.capacity(), 201);
        while s.len() < 201 {
            s.push_slot();
        }
        assert_eq!(s.capacity(), 201);
        s.push_slot();
        assert_eq!(s.capacity(), 301);
        assert_eq!(s.len(), 202);
    }

    #[test]
    fn copy_within_moves_bytes() {
        let mut s = store();
        let a = s.extend_one();
        let b = s.extend_one();
        s.set_coord(b, &[9.0, 8.0, 7.0]).unwrap();
        s.copy_within(b, a).unwrap();
        assert_eq!(s.coord(a).unwrap(), [9.0, 8.0, 7.0]);
    }
}
