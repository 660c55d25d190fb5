//! Quantum and classical register tracking.
//!
//! Every register gets a contiguous block of the flat physical numbering.
//! Registers, aliases and bound formals are all [`View`]s: ordered lists of
//! strided slices over registers. Aliasing composes slice arithmetic and
//! never allocates.

use qfold_ir::{ClbitId, QubitId};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Quantum or classical storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Quantum,
    Classical,
}

/// Lifecycle of one physical index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageState {
    Declared,
    Measured,
    Reset,
}

/// Index of a register in the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterId(usize);

/// A declared register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Register {
    /// Name used in emitted source (unique across the program).
    pub name: String,
    pub size: u32,
    /// First physical index.
    pub base: u32,
    pub kind: ResourceKind,
    states: Vec<UsageState>,
}

/// `len` elements of a register starting at `offset`, `stride` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub register: RegisterId,
    pub offset: u32,
    pub stride: i64,
    pub len: u32,
}

impl Slice {
    fn index(&self, k: u32) -> u32 {
        // Slices are built only from in-range positions.
        u32::try_from(i64::from(self.offset) + i64::from(k) * self.stride).unwrap_or(u32::MAX)
    }
}

/// An ordered selection of register elements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct View {
    segments: Vec<Slice>,
}

impl View {
    /// All of `register`.
    pub fn whole(register: RegisterId, size: u32) -> Self {
        Self {
            segments: vec![Slice {
                register,
                offset: 0,
                stride: 1,
                len: size,
            }],
        }
    }

    /// Number of elements.
    pub fn len(&self) -> u32 {
        self.segments.iter().map(|s| s.len).sum()
    }

    /// Check if the view selects nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register and index of position `pos`.
    pub fn locate(&self, mut pos: u32) -> Option<(RegisterId, u32)> {
        for seg in &self.segments {
            if pos < seg.len {
                return Some((seg.register, seg.index(pos)));
            }
            pos -= seg.len;
        }
        None
    }

    /// Concatenation (`a ++ b`).
    #[must_use]
    pub fn concat(mut self, other: &View) -> Self {
        self.segments.extend_from_slice(&other.segments);
        self
    }

    /// Sub-view of the given positions, merging runs that stay strided.
    pub fn pick(&self, positions: &[u32]) -> View {
        let mut segments: Vec<Slice> = Vec::new();
        for &pos in positions {
            let Some((register, index)) = self.locate(pos) else {
                continue;
            };
            if let Some(last) = segments.last_mut() {
                if last.register == register {
                    let next = i64::from(index) - i64::from(last.index(last.len - 1));
                    if last.len == 1 && next != 0 {
                        last.stride = next;
                        last.len = 2;
                        continue;
                    }
                    if next == last.stride && next != 0 {
                        last.len += 1;
                        continue;
                    }
                }
            }
            segments.push(Slice {
                register,
                offset: index,
                stride: 1,
                len: 1,
            });
        }
        View { segments }
    }

    /// The slices making up the view.
    pub fn segments(&self) -> &[Slice] {
        &self.segments
    }
}

/// Normalize a possibly negative index into `[0, len)`.
pub fn normalize_index(index: i64, len: u32) -> Result<u32, String> {
    let len_i = i64::from(len);
    let resolved = if index < 0 { index + len_i } else { index };
    if (0..len_i).contains(&resolved) {
        Ok(u32::try_from(resolved).unwrap_or(u32::MAX))
    } else {
        Err(format!("index {index} is out of range for size {len}"))
    }
}

/// Positions selected by an inclusive `start:step:end` range over `len`.
pub fn range_positions(
    start: Option<i64>,
    step: Option<i64>,
    end: Option<i64>,
    len: u32,
) -> Result<Vec<u32>, String> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err("range step must be non-zero".into());
    }
    let last = i64::from(len) - 1;
    let (default_start, default_end) = if step > 0 { (0, last) } else { (last, 0) };
    let start = i64::from(normalize_index(start.unwrap_or(default_start), len)?);
    let end = i64::from(normalize_index(end.unwrap_or(default_end), len)?);
    let mut positions = Vec::new();
    let mut i = start;
    while (step > 0 && i <= end) || (step < 0 && i >= end) {
        positions.push(u32::try_from(i).unwrap_or(u32::MAX));
        i += step;
    }
    Ok(positions)
}

/// Upper bound on the declared qubits, and separately on the declared bits,
/// of one program.
pub const MAX_RESOURCES: u32 = 1 << 24;

/// All registers of a program plus per-index usage.
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker {
    registers: Vec<Register>,
    names: FxHashSet<String>,
    num_qubits: u32,
    num_clbits: u32,
}

impl ResourceTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a register. A name already taken by another register gets a
    /// numeric suffix so emitted source stays unambiguous.
    ///
    /// Fails when the total of either kind would pass [`MAX_RESOURCES`].
    pub fn allocate(
        &mut self,
        name: &str,
        size: u32,
        kind: ResourceKind,
    ) -> Result<(RegisterId, View), String> {
        let counter = match kind {
            ResourceKind::Quantum => &mut self.num_qubits,
            ResourceKind::Classical => &mut self.num_clbits,
        };
        let base = *counter;
        let total = base
            .checked_add(size)
            .filter(|&t| t <= MAX_RESOURCES)
            .ok_or_else(|| {
                let what = match kind {
                    ResourceKind::Quantum => "qubits",
                    ResourceKind::Classical => "bits",
                };
                format!("register `{name}[{size}]` takes the program past {MAX_RESOURCES} {what}")
            })?;
        *counter = total;
        let unique = self.reserve_name(name);

        let id = RegisterId(self.registers.len());
        self.registers.push(Register {
            name: unique,
            size,
            base,
            kind,
            states: vec![UsageState::Declared; size as usize],
        });
        Ok((id, View::whole(id, size)))
    }

    /// Claim an emitted name, suffixing `_1`, `_2`, ... when `name` is taken.
    pub fn reserve_name(&mut self, name: &str) -> String {
        let mut unique = name.to_string();
        let mut n = 1;
        while self.names.contains(&unique) {
            unique = format!("{name}_{n}");
            n += 1;
        }
        self.names.insert(unique.clone());
        unique
    }

    /// Register by id.
    pub fn register(&self, id: RegisterId) -> &Register {
        &self.registers[id.0]
    }

    /// Registers of one kind in declaration order.
    pub fn registers(&self, kind: ResourceKind) -> impl Iterator<Item = &Register> {
        self.registers.iter().filter(move |r| r.kind == kind)
    }

    /// Total declared qubits.
    pub fn num_qubits(&self) -> u32 {
        self.num_qubits
    }

    /// Total declared clbits.
    pub fn num_clbits(&self) -> u32 {
        self.num_clbits
    }

    /// Resolve position `index` (negative counts from the end) of a view.
    pub fn resolve_index(&self, view: &View, index: i64) -> Result<u32, String> {
        let pos = normalize_index(index, view.len())?;
        let (register, offset) = view
            .locate(pos)
            .ok_or_else(|| format!("index {index} is out of range for size {}", view.len()))?;
        Ok(self.registers[register.0].base + offset)
    }

    /// Physical indices of every element of a view.
    pub fn physical(&self, view: &View) -> Vec<u32> {
        view.segments
            .iter()
            .flat_map(|seg| {
                let base = self.registers[seg.register.0].base;
                (0..seg.len).map(move |k| base + seg.index(k))
            })
            .collect()
    }

    /// Qubit ids of a quantum view.
    pub fn qubits(&self, view: &View) -> Vec<QubitId> {
        self.physical(view).into_iter().map(QubitId).collect()
    }

    /// Clbit ids of a classical view.
    pub fn clbits(&self, view: &View) -> Vec<ClbitId> {
        self.physical(view).into_iter().map(ClbitId).collect()
    }

    /// View of a single physical index.
    pub fn element_view(&self, kind: ResourceKind, physical: u32) -> Option<View> {
        let (id, reg) = self
            .registers
            .iter()
            .enumerate()
            .find(|(_, r)| r.kind == kind && physical >= r.base && physical - r.base < r.size)?;
        Some(View {
            segments: vec![Slice {
                register: RegisterId(id),
                offset: physical - reg.base,
                stride: 1,
                len: 1,
            }],
        })
    }

    /// View of a single physical qubit.
    pub fn qubit_view(&self, qubit: QubitId) -> Option<View> {
        self.element_view(ResourceKind::Quantum, qubit.0)
    }

    /// Record a state change of a qubit. Returns a warning message when a
    /// qubit is measured again without a reset in between.
    pub fn mark_used(&mut self, qubit: QubitId, state: UsageState) -> Option<String> {
        let reg = self.registers.iter_mut().find(|r| {
            r.kind == ResourceKind::Quantum && qubit.0 >= r.base && qubit.0 - r.base < r.size
        })?;
        let offset = (qubit.0 - reg.base) as usize;
        let previous = std::mem::replace(&mut reg.states[offset], state);
        (previous == UsageState::Measured && state == UsageState::Measured).then(|| {
            format!(
                "qubit {}[{offset}] is measured again without an intervening reset",
                reg.name
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_offsets() {
        let mut rt = ResourceTracker::new();
        let (_, q) = rt.allocate("q", 3, ResourceKind::Quantum).unwrap();
        let (_, r) = rt.allocate("r", 2, ResourceKind::Quantum).unwrap();
        let (_, c) = rt.allocate("c", 2, ResourceKind::Classical).unwrap();
        assert_eq!(rt.physical(&q), [0, 1, 2]);
        assert_eq!(rt.physical(&r), [3, 4]);
        assert_eq!(rt.physical(&c), [0, 1]);
        assert_eq!(rt.num_qubits(), 5);
        assert_eq!(rt.num_clbits(), 2);
    }

    #[test]
    fn test_duplicate_register_names_are_suffixed() {
        let mut rt = ResourceTracker::new();
        let (a, _) = rt.allocate("b", 1, ResourceKind::Classical).unwrap();
        let (b, _) = rt.allocate("b", 1, ResourceKind::Classical).unwrap();
        assert_eq!(rt.register(a).name, "b");
        assert_eq!(rt.register(b).name, "b_1");
    }

    #[test]
    fn test_negative_and_out_of_range_indices() {
        let mut rt = ResourceTracker::new();
        let (_, q) = rt.allocate("q", 4, ResourceKind::Quantum).unwrap();
        assert_eq!(rt.resolve_index(&q, -1), Ok(3));
        assert!(rt.resolve_index(&q, 5).is_err());
        assert!(rt.resolve_index(&q, -5).is_err());
    }

    #[test]
    fn test_alias_composes_slices() {
        let mut rt = ResourceTracker::new();
        let (_, _pad) = rt.allocate("p", 2, ResourceKind::Quantum).unwrap();
        let (_, q) = rt.allocate("q", 6, ResourceKind::Quantum).unwrap();
        // q[1:2:5] -> q[1], q[3], q[5]
        let odd = q.pick(&range_positions(Some(1), Some(2), Some(5), q.len()).unwrap());
        assert_eq!(odd.segments().len(), 1);
        assert_eq!(rt.physical(&odd), [3, 5, 7]);
        // alias of alias: odd[-1] is q[5]
        assert_eq!(rt.resolve_index(&odd, -1), Ok(7));
    }

    #[test]
    fn test_concat_and_reverse_range() {
        let mut rt = ResourceTracker::new();
        let (_, q) = rt.allocate("q", 3, ResourceKind::Quantum).unwrap();
        let (_, r) = rt.allocate("r", 2, ResourceKind::Quantum).unwrap();
        let both = q.clone().concat(&r);
        assert_eq!(both.len(), 5);
        let reversed = both.pick(&range_positions(None, Some(-1), None, both.len()).unwrap());
        assert_eq!(rt.physical(&reversed), [4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_zero_step_rejected() {
        assert!(range_positions(Some(0), Some(0), Some(2), 3).is_err());
    }

    #[test]
    fn test_measured_twice_warns() {
        let mut rt = ResourceTracker::new();
        rt.allocate("q", 1, ResourceKind::Quantum).unwrap();
        assert!(rt.mark_used(QubitId(0), UsageState::Measured).is_none());
        assert!(rt.mark_used(QubitId(0), UsageState::Measured).is_some());
        rt.mark_used(QubitId(0), UsageState::Reset);
        assert!(rt.mark_used(QubitId(0), UsageState::Measured).is_none());
    }

    #[test]
    fn test_qubit_view_round_trip() {
        let mut rt = ResourceTracker::new();
        rt.allocate("a", 2, ResourceKind::Quantum).unwrap();
        rt.allocate("b", 2, ResourceKind::Quantum).unwrap();
        let v = rt.qubit_view(QubitId(3)).unwrap();
        assert_eq!(rt.physical(&v), [3]);
        assert!(rt.element_view(ResourceKind::Classical, 3).is_none());
    }

    #[test]
    fn test_allocation_past_limit_fails() {
        let mut rt = ResourceTracker::new();
        assert!(rt.allocate("huge", u32::MAX, ResourceKind::Quantum).is_err());
        rt.allocate("q", 2, ResourceKind::Quantum).unwrap();
        assert!(rt.allocate("r", MAX_RESOURCES - 1, ResourceKind::Quantum).is_err());
        assert_eq!(rt.num_qubits(), 2);
        // The failed names stay free.
        let (id, _) = rt.allocate("huge", 1, ResourceKind::Quantum).unwrap();
        assert_eq!(rt.register(id).name, "huge");
    }
}
