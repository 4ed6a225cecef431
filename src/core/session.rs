// This module provides the build context and configuration of a Rogue compilation. BuildContext
// owns the bumpalo arena shared by analysis passes, the compiler options and the compilation
// statistics, and is created once per pipeline-stage compile, so nothing is shared between
// concurrent compiles. CompilerOptions bundles the debug flags (parsed from the comma-separated
// ROGUE_DEBUG environment variable), the device feature bits that influence selection and the
// optional pipeline layout. When no layout is supplied a deterministic dummy layout with
// zero-based offsets is substituted and every use of it is logged and tagged. BuildData is the
// side channel handed to the driver: per-stage I/O register maps, fragment discard and side
// effect flags, compute id registers and register usage counts.

//! Build context, configuration and driver build data.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Debug switches, mirroring the `ROGUE_DEBUG` environment variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugFlags {
    /// Print the input IR.
    pub nir: bool,
    /// Print the final shader.
    pub ir: bool,
    /// Print the shader after every pass.
    pub ir_passes: bool,
    /// Include register tables in shader dumps.
    pub ir_details: bool,
    /// Skip validation.
    pub vld_skip: bool,
    /// Collect validation errors instead of aborting on the first.
    pub vld_nonfatal: bool,
}

impl DebugFlags {
    pub const ENV_VAR: &'static str = "ROGUE_DEBUG";

    pub fn from_env() -> Self {
        match std::env::var(Self::ENV_VAR) {
            Ok(value) => Self::parse(&value),
            Err(_) => Self::default(),
        }
    }

    /// Parses a comma-separated flag list; unknown names are ignored with a warning.
    pub fn parse(value: &str) -> Self {
        let mut flags = Self::default();
        for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match name {
                "nir" => flags.nir = true,
                "ir" => flags.ir = true,
                "ir_passes" => flags.ir_passes = true,
                "ir_details" => flags.ir_details = true,
                "vld_skip" => flags.vld_skip = true,
                "vld_nonfatal" => flags.vld_nonfatal = true,
                other => log::warn!("Unknown {} flag \"{}\"", Self::ENV_VAR, other),
            }
        }
        flags
    }
}

/// Device features that change instruction selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// The texture unit clamps array layers itself.
    pub tpu_array_textures: bool,
}

/// Shared register offsets of one descriptor set's bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSetLayout {
    pub binding_offsets: HashMap<u32, u32>,
}

/// Where the driver places descriptor data in shared registers, per stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineLayout {
    /// Shared register pair holding the descriptor set table address.
    pub desc_set_table_offset: u32,
    /// Shared register pair holding the push constant buffer address.
    pub push_consts_offset: u32,
    /// Shared register pair holding the workgroup count buffer address.
    pub num_workgroups_offset: u32,
    /// First shared register of the image state words.
    pub image_base: u32,
    /// First shared register of the sampler state words.
    pub sampler_base: u32,
    /// Shared registers of the point sampler state.
    pub point_sampler: u32,
    /// First shared register of the secondary image words.
    pub image_secondary_base: u32,
    /// Vertex input base register per location.
    pub vs_input_base: HashMap<u32, u32>,
    pub sets: Vec<DescriptorSetLayout>,
    /// Set by [`PipelineLayout::dummy`].
    pub is_dummy: bool,
}

impl PipelineLayout {
    /// Zero-based layout for offline compilation; addresses built from it are not usable on hardware.
    pub fn dummy() -> Self {
        Self {
            is_dummy: true,
            ..Self::default()
        }
    }

    /// Shared register offset of a descriptor binding.
    pub fn binding_offset(&self, set: u32, binding: u32) -> u32 {
        self.sets
            .get(set as usize)
            .and_then(|s| s.binding_offsets.get(&binding).copied())
            .unwrap_or(0)
    }
}

/// Compilation options.
#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    pub debug: DebugFlags,
    pub device: DeviceInfo,
    pub pipeline_layout: Option<PipelineLayout>,
}

impl CompilerOptions {
    pub fn from_env() -> Self {
        Self {
            debug: DebugFlags::from_env(),
            ..Self::default()
        }
    }
}

/// Fragment shader sampling rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MsaaMode {
    #[default]
    Pixel,
    Sample,
}

/// Fragment input iterator layout: coefficient registers per input location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsBuildData {
    pub msaa_mode: MsaaMode,
    /// First coefficient register of each input location; components are 4 registers apart.
    pub iterator_base: HashMap<u32, u32>,
    /// Coefficient registers of the W iterator, if any smooth input exists.
    pub w_coeff: Option<u32>,
    pub num_coeffs: u32,
    pub discard: bool,
    pub side_effects: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VsInput {
    pub base: u32,
    pub components: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VsBuildData {
    pub inputs: HashMap<u32, VsInput>,
    /// vtxout register of each (location, component).
    pub outputs: HashMap<(u32, u32), u32>,
    pub num_vertex_outputs: u32,
    pub vertex_id_reg: u32,
    pub instance_id_reg: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsBuildData {
    /// vtxin registers of the local invocation ids.
    pub local_id_regs: [u32; 3],
    /// coeff registers of the workgroup ids.
    pub workgroup_regs: [u32; 3],
}

/// Side channel consumed by the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildData {
    pub fs: FsBuildData,
    pub vs: VsBuildData,
    pub cs: CsBuildData,
    pub temps: u32,
    pub internals: u32,
}

/// Compilation statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub shaders_compiled: usize,
    pub instructions_selected: usize,
    pub instructions_emitted: usize,
    pub passes_run: usize,
    pub passes_with_progress: usize,
    pub temps_allocated: u32,
    pub instruction_counts: HashMap<&'static str, usize>,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Statistics:")?;
        writeln!(f, "  Shaders compiled: {}", self.shaders_compiled)?;
        writeln!(f, "  Instructions selected: {}", self.instructions_selected)?;
        writeln!(f, "  Instructions emitted: {}", self.instructions_emitted)?;
        writeln!(
            f,
            "  Passes run: {} ({} made progress)",
            self.passes_run, self.passes_with_progress
        )?;
        writeln!(f, "  Temps allocated: {}", self.temps_allocated)?;

        if !self.instruction_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut counts: Vec<_> = self.instruction_counts.iter().collect();
            counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (op, count) in counts {
                writeln!(f, "    {op}: {count}")?;
            }
        }
        Ok(())
    }
}

/// Per-compile build context.
///
/// Owns the scratch arena used by analyses and the options every lowering
/// step consults. One context per concurrently compiled stage.
pub struct BuildContext<'arena> {
    arena: &'arena Bump,
    pub options: CompilerOptions,
    stats: RefCell<SessionStats>,
}

impl<'arena> BuildContext<'arena> {
    pub fn new(arena: &'arena Bump, options: CompilerOptions) -> Self {
        Self {
            arena,
            options,
            stats: RefCell::new(SessionStats::default()),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// The pipeline layout, or the dummy layout when none was supplied.
    pub fn layout(&self) -> PipelineLayout {
        match &self.options.pipeline_layout {
            Some(layout) => layout.clone(),
            None => PipelineLayout::dummy(),
        }
    }

    pub fn debug(&self) -> DebugFlags {
        self.options.debug
    }

    pub fn record_shader_compiled(&self, emitted: usize, temps: u32) {
        let mut stats = self.stats.borrow_mut();
        stats.shaders_compiled += 1;
        stats.instructions_emitted += emitted;
        stats.temps_allocated = stats.temps_allocated.max(temps);
    }

    pub fn record_instruction_selected(&self, op: &'static str) {
        let mut stats = self.stats.borrow_mut();
        stats.instructions_selected += 1;
        *stats.instruction_counts.entry(op).or_insert(0) += 1;
    }

    pub fn record_pass(&self, progress: bool) {
        let mut stats = self.stats.borrow_mut();
        stats.passes_run += 1;
        if progress {
            stats.passes_with_progress += 1;
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flags_parse() {
        let flags = DebugFlags::parse("ir, vld_nonfatal,bogus");
        assert!(flags.ir);
        assert!(flags.vld_nonfatal);
        assert!(!flags.nir);
        assert!(!flags.vld_skip);
    }

    #[test]
    fn test_dummy_layout_substituted() {
        let arena = Bump::new();
        let ctx = BuildContext::new(&arena, CompilerOptions::default());
        let layout = ctx.layout();
        assert!(layout.is_dummy);
        assert_eq!(layout.binding_offset(3, 7), 0);
    }

    #[test]
    fn test_stats_display() {
        let arena = Bump::new();
        let ctx = BuildContext::new(&arena, CompilerOptions::default());
        ctx.record_instruction_selected("fadd");
        ctx.record_instruction_selected("fadd");
        ctx.record_pass(true);
        ctx.record_pass(false);
        ctx.record_shader_compiled(3, 2);

        let output = ctx.stats().to_string();
        assert!(output.contains("Shaders compiled: 1"));
        assert!(output.contains("Passes run: 2 (1 made progress)"));
        assert!(output.contains("fadd: 2"));
    }
}
