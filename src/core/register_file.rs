// This module implements the Rogue register model. Every register belongs to a class (SSA
// virtual registers, physical temporaries, shared/uniform, coefficients, special hardware
// registers, constants, pixel/vertex I/O and index registers) and has an index inside that
// class; classes backed by hardware have a fixed capacity. RegisterFile owns all registers and
// register arrays of one shader in index-addressed arenas and deduplicates them through
// hashbrown caches keyed by (class, index) and (size, class, base index), so asking twice for
// the same logical register yields the same RegId. Register arrays are contiguous same-class
// runs; a sub-array created inside an existing array becomes its child and an array created
// around existing arrays adopts them, which keeps the tree at most one level deep. Each register
// and array keeps index-based use and write lists which the shader updates whenever an
// instruction operand changes. RegBitSet tracks per-class index usage for validation and is the
// free-list representation used by register allocation.

//! Register classes, registers, register arrays and their deduplicating caches.

use hashbrown::HashMap;

use super::instr::InstrId;

/// Register classes known to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegClass {
    Ssa,
    Temp,
    Coeff,
    Shared,
    Special,
    Internal,
    Const,
    Pixout,
    Vtxin,
    Vtxout,
    Index,
}

/// Static information about a register class.
#[derive(Debug, Clone, Copy)]
pub struct RegClassInfo {
    pub name: &'static str,
    pub prefix: &'static str,
    /// Number of hardware registers, zero when the class is unbounded.
    pub num: u32,
}

impl RegClass {
    pub const COUNT: usize = 11;

    pub const ALL: [RegClass; Self::COUNT] = [
        RegClass::Ssa,
        RegClass::Temp,
        RegClass::Coeff,
        RegClass::Shared,
        RegClass::Special,
        RegClass::Internal,
        RegClass::Const,
        RegClass::Pixout,
        RegClass::Vtxin,
        RegClass::Vtxout,
        RegClass::Index,
    ];

    pub const fn info(self) -> RegClassInfo {
        let (name, prefix, num) = match self {
            RegClass::Ssa => ("ssa", "%r", 0),
            RegClass::Temp => ("temp", "r", 248),
            RegClass::Coeff => ("coeff", "cf", 4096),
            RegClass::Shared => ("shared", "sh", 4096),
            RegClass::Special => ("special", "sr", 240),
            RegClass::Internal => ("internal", "i", 8),
            RegClass::Const => ("const", "sc", 240),
            RegClass::Pixout => ("pixout", "o", 8),
            RegClass::Vtxin => ("vtxin", "vi", 248),
            RegClass::Vtxout => ("vtxout", "vo", 256),
            RegClass::Index => ("index", "idx", 2),
        };
        RegClassInfo { name, prefix, num }
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        self.info().name
    }

    /// Hardware capacity, `None` for virtual classes.
    pub const fn capacity(self) -> Option<u32> {
        match self.info().num {
            0 => None,
            n => Some(n),
        }
    }
}

/// Fixed special register indices.
pub mod special {
    pub const X_P: u32 = 97;
    pub const Y_P: u32 = 98;
    pub const X_S: u32 = 99;
    pub const Y_S: u32 = 100;
    pub const SAMP_NUM: u32 = 101;
    pub const RENDER_TGT_ID: u32 = 102;
    pub const INST_NUM: u32 = 103;
}

const SSA_VEC_FLAG: u32 = 1 << 31;
const SSA_VEC_COMPONENT_BITS: u32 = 6;
pub const SSA_VEC_MAX_COMPONENTS: u32 = 1 << SSA_VEC_COMPONENT_BITS;

/// Index of component `component` of SSA vector `index`.
///
/// Vector components live in their own index space so they never alias
/// scalar SSA registers with the same value index.
pub const fn ssa_vec_index(index: u32, component: u32) -> u32 {
    SSA_VEC_FLAG | (index << SSA_VEC_COMPONENT_BITS) | component
}

/// Splits an SSA register index into (vector index, component) if it names a vector component.
pub const fn decode_ssa_vec_index(raw: u32) -> Option<(u32, u32)> {
    if raw & SSA_VEC_FLAG == 0 {
        return None;
    }
    let raw = raw & !SSA_VEC_FLAG;
    Some((raw >> SSA_VEC_COMPONENT_BITS, raw & (SSA_VEC_MAX_COMPONENTS - 1)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegarrayId(pub u32);

/// One operand slot of one instruction that reads or writes a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegUse {
    pub instr: InstrId,
    pub operand: u8,
}

#[derive(Debug, Clone)]
pub struct Reg {
    pub class: RegClass,
    pub index: u32,
    /// Root register array this register belongs to, if any.
    pub regarray: Option<RegarrayId>,
    pub uses: Vec<RegUse>,
    pub writes: Vec<RegUse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegarrayKey {
    pub size: u32,
    pub class: RegClass,
    pub start: u32,
}

#[derive(Debug, Clone)]
pub struct Regarray {
    pub size: u32,
    pub class: RegClass,
    pub start: u32,
    pub regs: Vec<RegId>,
    pub parent: Option<RegarrayId>,
    pub children: Vec<RegarrayId>,
    pub uses: Vec<RegUse>,
    pub writes: Vec<RegUse>,
}

impl Regarray {
    pub fn key(&self) -> RegarrayKey {
        RegarrayKey {
            size: self.size,
            class: self.class,
            start: self.start,
        }
    }

    fn contains_range(&self, start: u32, size: u32) -> bool {
        self.start <= start && start + size <= self.start + self.size
    }
}

/// Growable bit set over register indices of one class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegBitSet {
    words: Vec<u64>,
}

impl RegBitSet {
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    pub fn with_capacity(bits: u32) -> Self {
        Self {
            words: vec![0; (bits as usize).div_ceil(64)],
        }
    }

    pub fn contains(&self, index: u32) -> bool {
        self.words
            .get(index as usize / 64)
            .is_some_and(|w| w & (1u64 << (index % 64)) != 0)
    }

    pub fn set(&mut self, index: u32) {
        let word = index as usize / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (index % 64);
    }

    pub fn clear(&mut self, index: u32) {
        if let Some(w) = self.words.get_mut(index as usize / 64) {
            *w &= !(1u64 << (index % 64));
        }
    }

    pub fn set_range(&mut self, start: u32, len: u32) {
        for i in start..start + len {
            self.set(i);
        }
    }

    pub fn clear_range(&mut self, start: u32, len: u32) {
        for i in start..start + len {
            self.clear(i);
        }
    }

    /// Set union with another set.
    pub fn union(&mut self, other: &RegBitSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= *b;
        }
    }

    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Highest set index plus one.
    pub fn span(&self) -> u32 {
        for (i, w) in self.words.iter().enumerate().rev() {
            if *w != 0 {
                return i as u32 * 64 + (64 - w.leading_zeros());
            }
        }
        0
    }

    /// First index where `len` consecutive bits are clear, below `limit`.
    pub fn find_clear_run(&self, len: u32, limit: u32) -> Option<u32> {
        let mut start = 0;
        while start + len <= limit {
            match (start..start + len).find(|&i| self.contains(i)) {
                Some(taken) => start = taken + 1,
                None => return Some(start),
            }
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &w)| {
            (0..64u32)
                .filter(move |b| w & (1u64 << b) != 0)
                .map(move |b| wi as u32 * 64 + b)
        })
    }
}

/// Owner of all registers and register arrays of a shader.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    regs: Vec<Option<Reg>>,
    regarrays: Vec<Option<Regarray>>,
    reg_cache: HashMap<(RegClass, u32), RegId>,
    regarray_cache: HashMap<RegarrayKey, RegarrayId>,
    class_regs: Vec<Vec<RegId>>,
    used: Vec<RegBitSet>,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        Self {
            regs: Vec::new(),
            regarrays: Vec::new(),
            reg_cache: HashMap::new(),
            regarray_cache: HashMap::new(),
            class_regs: vec![Vec::new(); RegClass::COUNT],
            used: vec![RegBitSet::new(); RegClass::COUNT],
        }
    }

    /// Returns the canonical register for (class, index), creating it on first use.
    pub fn reg_cached(&mut self, class: RegClass, index: u32) -> RegId {
        if let Some(&id) = self.reg_cache.get(&(class, index)) {
            return id;
        }

        let id = RegId(self.regs.len() as u32);
        self.regs.push(Some(Reg {
            class,
            index,
            regarray: None,
            uses: Vec::new(),
            writes: Vec::new(),
        }));
        self.reg_cache.insert((class, index), id);
        self.class_regs[class.index()].push(id);
        // SSA vector indices are sparse; usage is only tracked for hardware classes.
        if class.capacity().is_some() {
            self.used[class.index()].set(index);
        }
        id
    }

    pub fn find_reg(&self, class: RegClass, index: u32) -> Option<RegId> {
        self.reg_cache.get(&(class, index)).copied()
    }

    /// Returns the canonical register array for (size, class, start), creating it and its
    /// member registers on first use.
    pub fn regarray_cached(&mut self, size: u32, class: RegClass, start: u32) -> RegarrayId {
        let key = RegarrayKey { size, class, start };
        if let Some(&id) = self.regarray_cache.get(&key) {
            return id;
        }

        let regs: Vec<RegId> = (0..size).map(|i| self.reg_cached(class, start + i)).collect();
        let id = RegarrayId(self.regarrays.len() as u32);

        let parent = self
            .live_regarrays()
            .find(|(_, ra)| {
                ra.class == class && ra.parent.is_none() && ra.size > size && ra.contains_range(start, size)
            })
            .map(|(pid, _)| pid);

        let mut regarray = Regarray {
            size,
            class,
            start,
            regs,
            parent,
            children: Vec::new(),
            uses: Vec::new(),
            writes: Vec::new(),
        };

        if let Some(pid) = parent {
            self.regarray_mut(pid).children.push(id);
        } else {
            // Adopt roots that fall inside the new array, flattening their children.
            let adopted: Vec<RegarrayId> = self
                .live_regarrays()
                .filter(|(_, ra)| {
                    ra.class == class && ra.parent.is_none() && regarray.contains_range(ra.start, ra.size)
                })
                .map(|(cid, _)| cid)
                .collect();
            for cid in adopted {
                let grandchildren = std::mem::take(&mut self.regarray_mut(cid).children);
                for &gc in &grandchildren {
                    self.regarray_mut(gc).parent = Some(id);
                }
                self.regarray_mut(cid).parent = Some(id);
                regarray.children.push(cid);
                regarray.children.extend(grandchildren);
            }
            for &reg in &regarray.regs {
                self.reg_mut(reg).regarray = Some(id);
            }
        }

        self.regarrays.push(Some(regarray));
        self.regarray_cache.insert(key, id);
        id
    }

    pub fn find_regarray(&self, size: u32, class: RegClass, start: u32) -> Option<RegarrayId> {
        self.regarray_cache
            .get(&RegarrayKey { size, class, start })
            .copied()
    }

    pub fn reg(&self, id: RegId) -> &Reg {
        match self.regs.get(id.0 as usize) {
            Some(Some(reg)) => reg,
            _ => super::error::invalid(format!("dangling register id {}", id.0)),
        }
    }

    pub fn reg_mut(&mut self, id: RegId) -> &mut Reg {
        match self.regs.get_mut(id.0 as usize) {
            Some(Some(reg)) => reg,
            _ => super::error::invalid(format!("dangling register id {}", id.0)),
        }
    }

    pub fn regarray(&self, id: RegarrayId) -> &Regarray {
        match self.regarrays.get(id.0 as usize) {
            Some(Some(ra)) => ra,
            _ => super::error::invalid(format!("dangling regarray id {}", id.0)),
        }
    }

    pub fn regarray_mut(&mut self, id: RegarrayId) -> &mut Regarray {
        match self.regarrays.get_mut(id.0 as usize) {
            Some(Some(ra)) => ra,
            _ => super::error::invalid(format!("dangling regarray id {}", id.0)),
        }
    }

    pub fn live_regs(&self) -> impl Iterator<Item = (RegId, &Reg)> + '_ {
        self.regs
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().map(|r| (RegId(i as u32), r)))
    }

    pub fn live_regarrays(&self) -> impl Iterator<Item = (RegarrayId, &Regarray)> + '_ {
        self.regarrays
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().map(|r| (RegarrayId(i as u32), r)))
    }

    pub fn class_regs(&self, class: RegClass) -> &[RegId] {
        &self.class_regs[class.index()]
    }

    pub fn used(&self, class: RegClass) -> &RegBitSet {
        &self.used[class.index()]
    }

    /// Number of distinct indices used in `class`.
    pub fn count_used(&self, class: RegClass) -> u32 {
        self.used[class.index()].count()
    }

    pub fn reg_cache_entry(&self, class: RegClass, index: u32) -> Option<RegId> {
        self.reg_cache.get(&(class, index)).copied()
    }

    pub fn regarray_cache_entry(&self, key: &RegarrayKey) -> Option<RegarrayId> {
        self.regarray_cache.get(key).copied()
    }

    /// Removes an unreferenced register.
    pub fn delete_reg(&mut self, id: RegId) {
        let Some(reg) = self.regs.get_mut(id.0 as usize).and_then(Option::take) else {
            return;
        };
        debug_assert!(reg.uses.is_empty() && reg.writes.is_empty());
        self.reg_cache.remove(&(reg.class, reg.index));
        self.class_regs[reg.class.index()].retain(|&r| r != id);
        if reg.class.capacity().is_some() {
            self.used[reg.class.index()].clear(reg.index);
        }
    }

    /// Removes an unreferenced register array, promoting its children to roots.
    pub fn delete_regarray(&mut self, id: RegarrayId) {
        let Some(ra) = self.regarrays.get_mut(id.0 as usize).and_then(Option::take) else {
            return;
        };
        debug_assert!(ra.uses.is_empty() && ra.writes.is_empty());
        self.regarray_cache.remove(&ra.key());

        if let Some(parent) = ra.parent {
            if let Some(Some(p)) = self.regarrays.get_mut(parent.0 as usize) {
                p.children.retain(|&c| c != id);
            }
        }

        // Children outlive their parent as independent roots; the largest one adopts the rest.
        let mut children = ra.children;
        children.sort_by_key(|&c| std::cmp::Reverse(self.regarray(c).size));
        let mut roots: Vec<RegarrayId> = Vec::new();
        for child in children {
            let (start, size) = {
                let c = self.regarray(child);
                (c.start, c.size)
            };
            let new_parent = roots
                .iter()
                .copied()
                .find(|&r| self.regarray(r).contains_range(start, size));
            self.regarray_mut(child).parent = new_parent;
            match new_parent {
                Some(p) => self.regarray_mut(p).children.push(child),
                None => roots.push(child),
            }
        }

        for &reg in &ra.regs {
            if let Some(Some(r)) = self.regs.get_mut(reg.0 as usize) {
                if r.regarray == Some(id) {
                    r.regarray = None;
                }
            }
        }
        for &root in &roots {
            let regs = self.regarray(root).regs.clone();
            for reg in regs {
                self.reg_mut(reg).regarray = Some(root);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reg_cache_dedup() {
        let mut rf = RegisterFile::new();
        let a = rf.reg_cached(RegClass::Temp, 3);
        let b = rf.reg_cached(RegClass::Temp, 3);
        let c = rf.reg_cached(RegClass::Shared, 3);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(rf.used(RegClass::Temp).contains(3));
        assert_eq!(rf.class_regs(RegClass::Temp), &[a]);
    }

    #[test]
    fn test_subarray_parenting() {
        let mut rf = RegisterFile::new();
        let base = ssa_vec_index(7, 0);
        let vec4 = rf.regarray_cached(4, RegClass::Ssa, base);
        let y = rf.regarray_cached(1, RegClass::Ssa, base + 1);
        assert_eq!(rf.regarray(y).parent, Some(vec4));
        assert_eq!(rf.regarray(y).regs[0], rf.regarray(vec4).regs[1]);
        assert_eq!(rf.reg(rf.regarray(vec4).regs[1]).regarray, Some(vec4));
    }

    #[test]
    fn test_parent_adopts_existing_roots() {
        let mut rf = RegisterFile::new();
        let lo = rf.regarray_cached(2, RegClass::Shared, 4);
        let x = rf.regarray_cached(1, RegClass::Shared, 4);
        assert_eq!(rf.regarray(x).parent, Some(lo));

        let whole = rf.regarray_cached(4, RegClass::Shared, 4);
        assert_eq!(rf.regarray(lo).parent, Some(whole));
        assert_eq!(rf.regarray(x).parent, Some(whole));
        assert!(rf.regarray(lo).children.is_empty());
    }

    #[test]
    fn test_ssa_vec_index_roundtrip() {
        let raw = ssa_vec_index(12, 3);
        assert_eq!(decode_ssa_vec_index(raw), Some((12, 3)));
        assert_eq!(decode_ssa_vec_index(12), None);
    }

    #[test]
    fn test_bitset_clear_run() {
        let mut set = RegBitSet::with_capacity(16);
        set.set_range(0, 2);
        set.set(3);
        assert_eq!(set.find_clear_run(1, 16), Some(2));
        assert_eq!(set.find_clear_run(2, 16), Some(4));
        assert_eq!(set.find_clear_run(4, 6), None);
        assert_eq!(set.span(), 4);
        assert_eq!(set.count(), 3);
    }

    #[test]
    fn test_delete_regarray_promotes_children() {
        let mut rf = RegisterFile::new();
        let whole = rf.regarray_cached(4, RegClass::Temp, 0);
        let half = rf.regarray_cached(2, RegClass::Temp, 2);
        rf.delete_regarray(whole);
        assert_eq!(rf.regarray(half).parent, None);
        assert!(rf.find_regarray(4, RegClass::Temp, 0).is_none());
    }
}
