// Texture sampling, gathers, texture queries and storage image access. Every access goes
// through one SMP instruction whose data operand is a contiguous register array: coordinates
// first, then the projector, the level of detail, interleaved gradients, the array layer
// address, the packed offset/sample word and finally any store data. When the coordinates are
// the only payload the source vector is passed through untouched. Array layers are clamped
// against the secondary image state and turned into a 64-bit address of the layer unless the
// texture unit handles arrays itself. Queries never sample: they read fields of the secondary
// state words directly.

use crate::core::error::{invalid, unsupported, unsupported_bits};
use crate::core::{AluOp, AluOpMod, BackendOp, BackendOpMod, BitwiseOp, Ref, Ref64, RegClass};
use crate::ir::{BaseType, Dest, Dim, Indices, IntrinsicOp, Src, TexInstr, TexOp, TexSrcKind};

use super::Isel;

/// Word offsets inside the secondary image state.
mod secondary {
    pub const WIDTH: u32 = 0;
    pub const ARRAYMAXINDEX: u32 = 3;
    pub const ARRAYBASE: u32 = 4;
    pub const ARRAYSTRIDE: u32 = 6;
}

/// Words of image state per texture.
const IMAGE_STATE_WORDS: u32 = 4;
/// Words of secondary state per texture.
const SECONDARY_WORDS: u32 = 8;
/// Words of sampler state per sampler.
const SAMPLER_STATE_WORDS: u32 = 4;

/// Gather returns its texels in this order relative to the sampled quad.
const GATHER_ORDER: [u32; 4] = [2, 3, 1, 0];

/// Where the secondary image state of an access lives.
#[derive(Clone, Copy)]
enum SecondaryState<'a> {
    /// Shared registers at a fixed offset.
    Fixed(u32),
    /// Indexed by a component of a source holding the state offset.
    Indexed(&'a Src, u32),
}

/// Everything one SMP needs to know.
struct SampleParams<'a> {
    dst: Ref,
    channels: u32,
    dim: Dim,
    is_array: bool,
    layer_is_cube_idx: bool,
    int_coord: bool,
    fcnorm: bool,
    point_sampler: bool,
    is_gather: bool,
    lod_bias: bool,

    coords: &'a Src,
    proj: Option<&'a Src>,
    lod: Option<&'a Src>,
    ddx: Option<&'a Src>,
    ddy: Option<&'a Src>,
    offset: Option<&'a Src>,
    ms_index: Option<&'a Src>,
    store_data: Option<&'a Src>,

    image_base: u32,
    image_idx: Option<(&'a Src, u32)>,
    sampler_base: u32,
    sampler_idx: Option<&'a Src>,
    secondary: SecondaryState<'a>,
}

/// Number of coordinate components a sample reads, and whether a cube fetched with integer
/// coordinates turns into a 2D array.
fn coord_components(dim: Dim, int_coord: bool) -> (u32, bool) {
    match dim {
        Dim::Cube if int_coord => (2, true),
        dim => (dim.coord_components(), false),
    }
}

fn components_of(isel: &Isel<'_, '_>, src: &Src) -> u32 {
    if src.swizzle.is_empty() {
        isel.info(src.value).num_components
    } else {
        src.swizzle.len() as u32
    }
}

impl Isel<'_, '_> {
    pub(super) fn translate_tex(&mut self, tex: &TexInstr) {
        use TexOp::*;

        if tex.src(TexSrcKind::Comparator).is_some() {
            unsupported("shadow comparison");
        }
        if tex.dest.bit_size != 32 {
            unsupported_bits("texture result", tex.dest.bit_size);
        }

        match tex.op {
            Tex | Txb | Txl | Txd | Txf | TxfMs | Tg4 => self.translate_sample(tex),
            Txs => {
                self.check_query_lod(tex);
                let secondary = self.tex_secondary(tex);
                self.texture_size(&tex.dest, tex.dim, tex.is_array, secondary);
            }
            TextureSamples => {
                let base = self.image_state_base(tex.texture_index);
                self.texture_samples(&tex.dest, base, tex.src(TexSrcKind::TextureOffset));
            }
            QueryLevels => {
                let base = self.image_state_base(tex.texture_index);
                let word = self.image_word(base + 2, tex.src(TexSrcKind::TextureOffset));
                let dst = self.dest_comp(&tex.dest, 0);
                self.b
                    .bitwise(BitwiseOp::Iand, &[dst], &[word, Ref::imm(0xf)]);
            }
            Lod => unsupported("texture op lod"),
        }
    }

    fn translate_sample(&mut self, tex: &TexInstr) {
        let Some(coords) = tex.src(TexSrcKind::Coord) else {
            invalid(format!("{} without coordinates", tex.op.name()));
        };
        let int_coord = matches!(tex.op, TexOp::Txf | TexOp::TxfMs);
        let is_gather = tex.op == TexOp::Tg4;
        let lod_bias = tex.op == TexOp::Txb;
        let lod = if lod_bias {
            tex.src(TexSrcKind::Bias)
        } else {
            tex.src(TexSrcKind::Lod)
        };

        self.dummy_layout_used("texture sample");
        let mut sampler_base = self.layout.sampler_base + tex.sampler_index * SAMPLER_STATE_WORDS;
        if is_gather {
            sampler_base += SAMPLER_STATE_WORDS;
        }
        let (dst, gather_index, channels) = if is_gather {
            let (vec, index) = self.new_vec(16);
            (vec, index, 4)
        } else {
            (self.dest_ref(&tex.dest), 0, tex.dest.num_components)
        };

        let params = SampleParams {
            dst,
            channels,
            dim: tex.dim,
            is_array: tex.is_array,
            layer_is_cube_idx: true,
            int_coord,
            fcnorm: tex.dest_type == BaseType::Float,
            point_sampler: int_coord || tex.point_sampler,
            is_gather,
            lod_bias,
            coords,
            proj: tex.src(TexSrcKind::Projector),
            lod: if is_gather { None } else { lod },
            ddx: tex.src(TexSrcKind::Ddx),
            ddy: tex.src(TexSrcKind::Ddy),
            offset: tex.src(TexSrcKind::Offset),
            ms_index: tex.src(TexSrcKind::MsIndex),
            store_data: None,
            image_base: self.image_state_base(tex.texture_index),
            image_idx: tex.src(TexSrcKind::TextureOffset).map(|src| (src, 0)),
            sampler_base,
            sampler_idx: tex.src(TexSrcKind::SamplerOffset),
            secondary: self.tex_secondary(tex),
        };
        self.emit_sample(&params);

        if is_gather {
            for (i, &texel) in GATHER_ORDER.iter().enumerate() {
                let src = self
                    .shader()
                    .ssa_vec(1, gather_index, texel * 4 + tex.component);
                let d = self.dest_comp(&tex.dest, i as u32);
                self.b.mov(d, src);
            }
        }
    }

    pub(super) fn translate_image(
        &mut self,
        op: IntrinsicOp,
        dest: Option<&Dest>,
        srcs: &[Src],
        indices: &Indices,
    ) {
        let dim = indices.dim.unwrap_or(Dim::D2);
        let image = &srcs[0];
        self.dummy_layout_used(op.name());

        let dest_of = |what: &str| match dest {
            Some(dest) => dest,
            None => invalid(format!("{what} without a destination")),
        };

        match op {
            IntrinsicOp::ImageSize => {
                let dest = dest_of(op.name());
                self.texture_size(dest, dim, indices.array, SecondaryState::Indexed(image, 0));
            }
            IntrinsicOp::ImageSamples => {
                let dest = dest_of(op.name());
                self.texture_samples(dest, self.layout.image_base, Some(image));
            }
            IntrinsicOp::ImageLoad | IntrinsicOp::ImageStore => {
                let store = op == IntrinsicOp::ImageStore;
                let (dst, channels, store_data) = if store {
                    let data = &srcs[3];
                    if self.bits(data.value) != 32 {
                        unsupported_bits("image_store", self.bits(data.value));
                    }
                    let channels = components_of(self, data);
                    (self.shader().new_ssa_vec(channels), channels, Some(data))
                } else {
                    let dest = dest_of(op.name());
                    if dest.bit_size != 32 {
                        unsupported_bits("image_load", dest.bit_size);
                    }
                    (self.dest_ref(dest), dest.num_components, None)
                };
                let lod = if store { &srcs[4] } else { &srcs[3] };

                let params = SampleParams {
                    dst,
                    channels,
                    dim,
                    is_array: indices.array,
                    layer_is_cube_idx: false,
                    int_coord: true,
                    fcnorm: !store && indices.ty.unwrap_or(BaseType::Float) == BaseType::Float,
                    point_sampler: true,
                    is_gather: false,
                    lod_bias: false,
                    coords: &srcs[1],
                    proj: None,
                    lod: Some(lod),
                    ddx: None,
                    ddy: None,
                    offset: None,
                    ms_index: None,
                    store_data,
                    image_base: self.layout.image_base,
                    image_idx: Some((image, 0)),
                    sampler_base: self.layout.sampler_base,
                    sampler_idx: None,
                    secondary: SecondaryState::Indexed(image, 1),
                };
                let id = self.emit_sample(&params);
                let comment = if store { "image_store" } else { "image_load" };
                self.b.edit(id).set_comment(comment);
            }
            _ => invalid(format!("{} is not an image intrinsic", op.name())),
        }
    }

    /// A fresh SSA vector together with its index, for addressing single components.
    fn new_vec(&mut self, size: u32) -> (Ref, u32) {
        let index = self.shader().next_ssa_idx;
        (self.shader().new_ssa_vec(size), index)
    }

    fn image_state_base(&self, texture_index: u32) -> u32 {
        self.layout.image_base + texture_index * IMAGE_STATE_WORDS
    }

    fn tex_secondary<'t>(&self, tex: &'t TexInstr) -> SecondaryState<'t> {
        match tex.src(TexSrcKind::Secondary) {
            Some(src) => SecondaryState::Indexed(src, 0),
            None => SecondaryState::Fixed(
                self.layout.image_secondary_base + tex.texture_index * SECONDARY_WORDS,
            ),
        }
    }

    /// Word `offset` of the secondary image state.
    fn secondary_word(&mut self, state: SecondaryState<'_>, offset: u32) -> Ref {
        match state {
            SecondaryState::Fixed(base) => self.shader().reg_ref(RegClass::Shared, base + offset),
            SecondaryState::Indexed(src, c) => self.shared_indexed(src, c, offset),
        }
    }

    fn secondary_word64(&mut self, state: SecondaryState<'_>, offset: u32) -> Ref64 {
        let lo = self.secondary_word(state, offset);
        let hi = self.secondary_word(state, offset + 1);
        Ref64::new(lo, hi)
    }

    /// Word of the primary image state, indexed when the texture is chosen at run time.
    fn image_word(&mut self, offset: u32, index: Option<&Src>) -> Ref {
        match index {
            Some(src) => self.shared_indexed(src, 0, offset),
            None => self.shader().reg_ref(RegClass::Shared, offset),
        }
    }

    fn check_query_lod(&self, tex: &TexInstr) {
        if let Some(lod) = tex.src(TexSrcKind::Lod) {
            if self.require_const(lod, "texture size lod") != 0 {
                unsupported("texture size query of a level other than 0");
            }
        }
    }

    fn texture_size(&mut self, dest: &Dest, dim: Dim, is_array: bool, state: SecondaryState<'_>) {
        let cc = match dim {
            Dim::Cube => 2,
            dim => dim.coord_components(),
        };
        if dest.num_components != cc + is_array as u32 {
            invalid(format!(
                "{}-component texture size of a {}{} texture",
                dest.num_components,
                dim.name(),
                if is_array { " array" } else { "" }
            ));
        }
        for c in 0..cc {
            let word = self.secondary_word(state, secondary::WIDTH + c);
            let d = self.dest_comp(dest, c);
            self.b.mov(d, word);
        }
        if is_array {
            let max_index = self.secondary_word(state, secondary::ARRAYMAXINDEX);
            let d = self.dest_comp(dest, cc);
            self.b
                .alu(AluOp::Iadd32, &[d], &[max_index, Ref::imm(1)]);
        }
    }

    /// Sample count, stored as a power of two in the top bits of image state word 1.
    fn texture_samples(&mut self, dest: &Dest, base: u32, index: Option<&Src>) {
        let word = self.image_word(base + 1, index);
        let tmp = self.shader().new_ssa();
        self.b.mov(tmp, word);
        let log2 = self.shader().new_ssa();
        self.b
            .bitwise(BitwiseOp::Ushr, &[log2], &[tmp, Ref::imm(30)]);
        let d = self.dest_comp(dest, 0);
        self.b
            .bitwise(BitwiseOp::Ishl, &[d], &[Ref::imm(1), log2]);
    }

    /// Clamped array layer turned into the address of the layer.
    fn layer_address(&mut self, p: &SampleParams<'_>, cc: u32, cube_array: bool) -> Ref64 {
        let mut layer = self.src_comp(p.coords, cc);
        if !p.int_coord {
            let rounded = self.shader().new_ssa();
            self.b.alu(AluOp::PckU32, &[rounded], &[layer]);
            layer = rounded;
        }

        let positive = self.shader().new_ssa();
        let max = self.b.alu(AluOp::Max, &[positive], &[layer, Ref::imm(0)]);
        self.b.edit(max).set_mod(AluOpMod::S32.bit());

        let mut max_index = self.secondary_word(p.secondary, secondary::ARRAYMAXINDEX);
        if cube_array && !p.layer_is_cube_idx {
            // Faces are addressed individually: last face of the last cube.
            let faces = self.shader().new_ssa();
            self.b.alu(
                AluOp::Madd32,
                &[faces, Ref::None],
                &[max_index, Ref::imm(6), Ref::imm(5), Ref::None],
            );
            max_index = faces;
        }

        let mut clamped = self.shader().new_ssa();
        let min = self.b.alu(AluOp::Min, &[clamped], &[positive, max_index]);
        self.b.edit(min).set_mod(AluOpMod::S32.bit());

        if cube_array && p.layer_is_cube_idx {
            let face = self.shader().new_ssa();
            self.b
                .alu(AluOp::Imul32, &[face], &[clamped, Ref::imm(6)]);
            clamped = face;
        }

        let stride = self.secondary_word(p.secondary, secondary::ARRAYSTRIDE);
        let base = self.secondary_word64(p.secondary, secondary::ARRAYBASE);
        let (_, index) = self.new_vec(2);
        let address = Ref64::new(
            self.shader().ssa_vec(1, index, 0),
            self.shader().ssa_vec(1, index, 1),
        );
        self.b.alu(
            AluOp::Madd64,
            &[address.lo, address.hi],
            &[stride, clamped, base.lo, base.hi, Ref::None],
        );
        address
    }

    /// Packs the texel offsets and the sample index into one word.
    fn options_word(&mut self, p: &SampleParams<'_>, cc: u32) -> Ref {
        let mut word = Ref::imm(0);
        let mut fields: Vec<(Ref, u32, u32)> = Vec::new();
        if let Some(offset) = p.offset {
            for c in 0..cc {
                fields.push((self.src_comp(offset, c), 0x1f, 5 * c));
            }
        }
        if let Some(ms_index) = p.ms_index {
            fields.push((self.src_comp(ms_index, 0), 0x7, 16));
        }
        for (value, mask, shift) in fields {
            let masked = self.shader().new_ssa();
            self.b
                .bitwise(BitwiseOp::Iand, &[masked], &[value, Ref::imm(mask)]);
            let shifted = self.shader().new_ssa();
            self.b
                .bitwise(BitwiseOp::Ishl, &[shifted], &[masked, Ref::imm(shift)]);
            let merged = self.shader().new_ssa();
            self.b
                .bitwise(BitwiseOp::Ior, &[merged], &[word, shifted]);
            word = merged;
        }
        word
    }

    fn emit_sample(&mut self, p: &SampleParams<'_>) -> crate::core::InstrId {
        let (cc, cube_as_array) = coord_components(p.dim, p.int_coord);
        let is_array = p.is_array || cube_as_array;
        let tpu_arrays = self.ctx.options.device.tpu_array_textures;
        // Cubes fetched with integer coordinates still address faces through the layer.
        let cube_array = p.dim == Dim::Cube && is_array;

        let mut size = cc;
        if is_array && !tpu_arrays {
            size += 2;
        }
        size += p.proj.is_some() as u32;
        size += (p.lod.is_some() || p.is_gather) as u32;
        if p.ddx.is_some() {
            size += cc * 2;
        }
        size += (p.offset.is_some() || p.ms_index.is_some()) as u32;
        let data_words = p
            .store_data
            .map_or(0, |data| components_of(self, data));
        size += data_words;

        let data = if size == cc {
            let n = components_of(self, p.coords);
            self.src_ref(p.coords, n)
        } else {
            let (data, index) = self.new_vec(size);
            let mut parts: Vec<Ref> = Vec::with_capacity(size as usize);

            for c in 0..cc {
                parts.push(self.src_comp(p.coords, c));
            }
            if let Some(proj) = p.proj {
                parts.push(self.src_comp(proj, 0));
            }
            if let Some(lod) = p.lod {
                parts.push(self.src_comp(lod, 0));
            } else if p.is_gather {
                parts.push(Ref::imm(0));
            }
            if let (Some(ddx), Some(ddy)) = (p.ddx, p.ddy) {
                for c in 0..cc {
                    parts.push(self.src_comp(ddx, c));
                    parts.push(self.src_comp(ddy, c));
                }
            } else if p.ddx.is_some() {
                invalid("texture gradient without both derivatives");
            }
            if is_array && !tpu_arrays {
                let address = self.layer_address(p, cc, cube_array);
                parts.push(address.lo);
                parts.push(address.hi);
            }
            if p.offset.is_some() || p.ms_index.is_some() {
                let word = self.options_word(p, cc);
                parts.push(word);
            }
            if let Some(store) = p.store_data {
                for c in 0..data_words {
                    parts.push(self.src_comp(store, c));
                }
            }

            for (i, part) in parts.into_iter().enumerate() {
                let d = self.shader().ssa_vec(1, index, i as u32);
                self.b.mov(d, part);
            }
            data
        };

        let image = match p.image_idx {
            Some((src, c)) => {
                let value = self.src_comp(src, c);
                let idx0 = self.shader().reg_ref(RegClass::Index, 0);
                self.b.mov(idx0, value);
                let reg = self.shader().regs.reg_cached(RegClass::Shared, p.image_base);
                Ref::RegIndexed { reg, index: 0 }
            }
            None => self
                .shader()
                .regarray_ref(IMAGE_STATE_WORDS, RegClass::Shared, p.image_base),
        };

        let sampler = if p.point_sampler {
            let point = self.layout.point_sampler;
            self.shader()
                .regarray_ref(SAMPLER_STATE_WORDS, RegClass::Shared, point)
        } else if let Some(src) = p.sampler_idx {
            let value = self.src_comp(src, 0);
            let idx1 = self.shader().reg_ref(RegClass::Index, 1);
            self.b.mov(idx1, value);
            let reg = self.shader().regs.reg_cached(RegClass::Shared, p.sampler_base);
            Ref::RegIndexed { reg, index: 1 }
        } else {
            self.shader()
                .regarray_ref(SAMPLER_STATE_WORDS, RegClass::Shared, p.sampler_base)
        };

        let op = match cc {
            1 => BackendOp::Smp1d,
            2 => BackendOp::Smp2d,
            3 => BackendOp::Smp3d,
            _ => invalid(format!("{cc}-component texture coordinates")),
        };
        let smp = self.b.backend(
            op,
            &[p.dst],
            &[Ref::drc(0), image, data, sampler, Ref::None, Ref::val(p.channels)],
        );

        let mut mods = 0;
        if p.proj.is_some() {
            mods |= BackendOpMod::Proj.bit();
        }
        if p.lod.is_some() || p.is_gather {
            mods |= BackendOpMod::PpLod.bit();
            mods |= if p.lod_bias {
                BackendOpMod::Bias.bit()
            } else {
                BackendOpMod::Replace.bit()
            };
        }
        if is_array && !tpu_arrays {
            mods |= BackendOpMod::Tao.bit();
        }
        if p.ddx.is_some() {
            mods |= BackendOpMod::Gradient.bit();
        }
        if p.ms_index.is_some() {
            mods |= BackendOpMod::Sno.bit();
        }
        if p.offset.is_some() {
            mods |= BackendOpMod::Soo.bit();
        }
        mods |= if p.int_coord {
            BackendOpMod::Integer.bit()
        } else {
            BackendOpMod::NnCoords.bit()
        };
        if p.fcnorm {
            mods |= BackendOpMod::Fcnorm.bit();
        }
        if p.store_data.is_some() {
            mods |= BackendOpMod::Wrt.bit();
        }
        if p.is_gather {
            mods |= BackendOpMod::Data.bit();
        }
        self.b.edit(smp).set_mod(mods);
        smp
    }
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;

    use super::{coord_components, GATHER_ORDER};
    use crate::core::{BuildContext, CompilerOptions, Shader};
    use crate::ir::{parse_ir, Dim};

    fn select_src(src: &str) -> Shader {
        let ir = parse_ir(src).unwrap();
        let arena = Bump::new();
        let ctx = BuildContext::new(&arena, CompilerOptions::default());
        super::super::select(&ctx, &ir)
    }

    #[test]
    fn test_coord_components() {
        assert_eq!(coord_components(Dim::D1, false), (1, false));
        assert_eq!(coord_components(Dim::D3, true), (3, false));
        assert_eq!(coord_components(Dim::Cube, false), (3, false));
        assert_eq!(coord_components(Dim::Cube, true), (2, true));
    }

    const COORDS: &str = "%0:32 = @load_preamble() [base=0]\n\
                          %1:32 = @load_preamble() [base=1]\n\
                          %2:32x2 = vec2 %0, %1\n";

    #[test]
    fn test_plain_sample_passes_coordinates_through() {
        let _ = env_logger::builder().is_test(true).try_init();
        let text = select_src(&format!(
            "shader fs \"tex\"\n{COORDS}%3:32x4 = tex.tex(coord=%2)\n"
        ))
        .to_string();
        assert!(text.contains("smp2d.fcnorm.nncoords %r3[0..3], drc0, sh["), "{text}");
        assert!(text.contains("], %r2[0..1], sh["), "{text}");
    }

    #[test]
    fn test_gather_reorders_texels() {
        let _ = env_logger::builder().is_test(true).try_init();
        let text = select_src(&format!(
            "shader fs \"tg4\"\n{COORDS}%3:32x4 = tex.tg4(coord=%2) [component=1]\n"
        ))
        .to_string();
        assert!(
            text.contains("smp2d.fcnorm.nncoords.replace.pplod.data %r4[0..15], drc0"),
            "{text}"
        );
        for (i, texel) in GATHER_ORDER.iter().enumerate() {
            let line = format!("mov %r3[{}], %r4[{}]", i, texel * 4 + 1);
            assert!(text.contains(&line), "missing {line} in {text}");
        }
    }

    fn line_with<'t>(text: &'t str, needle: &str) -> &'t str {
        match text.lines().find(|line| line.contains(needle)) {
            Some(line) => line,
            None => panic!("no `{needle}` in\n{text}"),
        }
    }

    #[test]
    fn test_array_layer_is_clamped_and_addressed() {
        let _ = env_logger::builder().is_test(true).try_init();
        let text = select_src(&format!(
            "shader fs \"tex_array\"\n{COORDS}\
             %3:32x3 = vec3 %0, %1, %1\n\
             %4:32x4 = tex.tex(coord=%3) [dim=2d, array=1]\n"
        ))
        .to_string();
        // Float layers are rounded before the clamp.
        assert!(text.contains("pck_u32"), "{text}");
        assert!(line_with(&text, "max.s32 ").contains(", 0x0"), "{text}");
        assert!(line_with(&text, "min.s32 ").contains(", sh3"), "{text}");
        let address = line_with(&text, "madd64 ");
        assert!(address.contains(", sh6, "), "{address}");
        assert!(address.contains(", sh4, sh5, _"), "{address}");
        assert!(!text.contains("imul32"), "{text}");
        assert!(!text.contains("madd32"), "{text}");
        assert!(line_with(&text, "smp2d.").contains(".tao "), "{text}");
    }

    #[test]
    fn test_cube_array_layer_selects_first_face() {
        let _ = env_logger::builder().is_test(true).try_init();
        let text = select_src(&format!(
            "shader fs \"tex_cube\"\n{COORDS}\
             %3:32x4 = vec4 %0, %1, %1, %0\n\
             %4:32x4 = tex.tex(coord=%3) [dim=cube, array=1]\n"
        ))
        .to_string();
        assert!(line_with(&text, "min.s32 ").contains(", sh3"), "{text}");
        assert!(line_with(&text, "imul32 ").contains(", 0x6"), "{text}");
        assert!(!text.contains("madd32"), "{text}");
        assert!(line_with(&text, "smp3d.").contains(".tao "), "{text}");
    }

    #[test]
    fn test_image_cube_array_clamps_to_last_face() {
        let _ = env_logger::builder().is_test(true).try_init();
        let text = select_src(
            "shader cs \"img_cube\"\n\
             %0:32 = @load_preamble() [base=0]\n\
             %1:32x3 = vec3 %0, %0, %0\n\
             %2:32x2 = load_const (0, 8)\n\
             %3:32x4 = @image_load(%2, %1, %0, %0) [dim=cube, array=1]\n",
        )
        .to_string();
        // Secondary state of image 8: max index at 8 + 3, base at 8 + 4, stride at 8 + 6.
        assert!(!text.contains("pck_u32"), "{text}");
        assert!(line_with(&text, "max.s32 ").contains(", 0x0"), "{text}");
        assert!(
            line_with(&text, "madd32 ").contains(", sh11, 0x6, 0x5, _"),
            "{text}"
        );
        assert!(!line_with(&text, "min.s32 ").contains("sh11"), "{text}");
        assert!(!text.contains("imul32"), "{text}");
        let address = line_with(&text, "madd64 ");
        assert!(address.contains(", sh14, "), "{address}");
        assert!(address.contains(", sh12, sh13, _"), "{address}");
        let smp = line_with(&text, "smp2d.");
        assert!(smp.contains(".tao"), "{smp}");
        assert!(smp.contains("{image_load}"), "{smp}");
    }
}
