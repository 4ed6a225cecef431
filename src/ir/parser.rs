//! RIR (Rogue IR) parser implementation.

use super::*;

pub fn parse_ir(text: &str) -> Result<IrShader, ParseError> {
    let parser = Parser::new(text);
    parser.parse()
}

type PResult<T> = Result<T, ParseError>;

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    shader: IrShader,
    loop_depth: u32,

    // SSA reads, checked against the defs once the whole body is known.
    uses: Vec<u32>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            shader: IrShader::new(Stage::Fragment, ""),
            loop_depth: 0,
            uses: Vec::new(),
        }
    }

    fn parse(mut self) -> PResult<IrShader> {
        self.parse_header()?;
        self.parse_decls()?;

        let body = self.parse_cf_list()?;
        self.skip_whitespace(true);
        if !self.is_eof() {
            return Err(self.error(format!("Unexpected {:?} at top level", self.current_char())));
        }
        self.shader.body = body;

        // Resolve all references
        for &index in &self.uses {
            if !self.shader.defs.contains_key(&index) {
                return Err(ParseError::UndefinedValue(index));
            }
        }
        Ok(self.shader)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let end = self.pos.min(self.text.len());
        ParseError::Syntax {
            line: self.text[..end].matches('\n').count() + 1,
            message: message.into(),
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text.get(self.pos..).and_then(|rest| rest.chars().next())
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                // Skip comment line
                while let Some(ch) = self.current_char() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if ch.is_whitespace() {
                if ch == '\n' && !skip_newlines {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace(true);
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Like `try_read`, but only looks at the rest of the current line.
    fn try_read_inline(&mut self, ch: char) -> bool {
        self.skip_whitespace(false);
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> PResult<()> {
        if !self.try_read(ch) {
            return Err(self.error(format!(
                "Expected '{}' but found {:?}",
                ch,
                self.current_char()
            )));
        }
        Ok(())
    }

    fn peek_identifier(&mut self) -> Option<&'a str> {
        let saved = self.pos;
        let ident = self.read_identifier().ok();
        self.pos = saved;
        ident
    }

    fn read_identifier(&mut self) -> PResult<&'a str> {
        self.skip_whitespace(true);
        let start = self.pos;

        match self.current_char() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            Some(ch) => return Err(self.error(format!("Expected identifier but found '{}'", ch))),
            None => return Err(self.error("Expected identifier but found EOF")),
        }

        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        Ok(&self.text[start..self.pos])
    }

    fn expect_keyword(&mut self, keyword: &str) -> PResult<()> {
        let ident = self.read_identifier()?;
        if ident != keyword {
            return Err(self.error(format!("Expected '{keyword}' but found '{ident}'")));
        }
        Ok(())
    }

    fn read_number(&mut self) -> PResult<u32> {
        self.skip_whitespace(true);
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_alphanumeric() {
                self.advance();
            } else {
                break;
            }
        }
        let token = &self.text[start..self.pos];
        parse_u64(token)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| self.error(format!("Expected number but found '{token}'")))
    }

    /// Reads a literal token: an optional sign followed by alphanumerics and dots.
    fn read_token(&mut self) -> &'a str {
        let start = self.pos;
        if matches!(self.current_char(), Some('-') | Some('+')) {
            self.advance();
        }
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '.' || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        &self.text[start..self.pos]
    }

    fn read_string(&mut self) -> PResult<&'a str> {
        self.expect('"')?;
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch == '"' {
                let s = &self.text[start..self.pos];
                self.advance();
                return Ok(s);
            }
            if ch == '\n' {
                break;
            }
            self.advance();
        }
        Err(self.error("Unterminated string"))
    }

    /// `key=value` pairs up to the end of the line.
    fn read_line_attrs(&mut self) -> PResult<Vec<(&'a str, &'a str)>> {
        let mut attrs = Vec::new();
        loop {
            self.skip_whitespace(false);
            match self.current_char() {
                Some(ch) if ch.is_alphabetic() => {}
                _ => return Ok(attrs),
            }
            let key = self.read_identifier()?;
            self.expect('=')?;
            self.skip_whitespace(false);
            attrs.push((key, self.read_token()));
        }
    }

    /// `[key=value, ...]`, where a bare key means `key=1`. The opening bracket is consumed.
    fn read_bracket_attrs(&mut self) -> PResult<Vec<(&'a str, &'a str)>> {
        let mut attrs = Vec::new();
        if self.try_read(']') {
            return Ok(attrs);
        }
        loop {
            let key = self.read_identifier()?;
            let value = if self.try_read('=') {
                self.skip_whitespace(true);
                self.read_token()
            } else {
                "1"
            };
            attrs.push((key, value));
            if self.try_read(']') {
                return Ok(attrs);
            }
            self.expect(',')?;
        }
    }

    fn attr_number(&self, key: &str, value: &str) -> PResult<u32> {
        parse_u64(value)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| self.error(format!("Invalid value '{value}' for '{key}'")))
    }

    // ---- Header and declarations ----

    fn parse_header(&mut self) -> PResult<()> {
        self.expect_keyword("shader")?;
        let stage = self.read_identifier()?;
        self.shader.stage =
            Stage::from_name(stage).ok_or_else(|| self.error(format!("Unknown stage '{stage}'")))?;
        self.skip_whitespace(true);
        self.shader.name = self.read_string()?.to_string();
        Ok(())
    }

    fn parse_decls(&mut self) -> PResult<()> {
        loop {
            match self.peek_identifier() {
                Some("option") => {
                    self.read_identifier()?;
                    match self.read_identifier()? {
                        "per_sample" => self.shader.per_sample = true,
                        other => return Err(self.error(format!("Unknown option '{other}'"))),
                    }
                }
                Some(kw @ ("decl_input" | "decl_output")) => {
                    self.read_identifier()?;
                    let var = self.parse_io_var()?;
                    if kw == "decl_input" {
                        self.shader.inputs.push(var);
                    } else {
                        self.shader.outputs.push(var);
                    }
                }
                Some("decl_reg") => {
                    self.read_identifier()?;
                    let reg = self.parse_reg_decl()?;
                    if self.shader.register(reg.index).is_some() {
                        return Err(self.error(format!("Register ${} declared twice", reg.index)));
                    }
                    self.shader.registers.push(reg);
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_io_var(&mut self) -> PResult<IoVar> {
        let mut var = IoVar {
            location: u32::MAX,
            components: 1,
            bit_size: 32,
            interp: Interp::Smooth,
        };
        for (key, value) in self.read_line_attrs()? {
            match key {
                "location" => var.location = self.attr_number(key, value)?,
                "components" => var.components = self.attr_number(key, value)?,
                "bits" => var.bit_size = self.attr_number(key, value)?,
                "interp" => {
                    var.interp = Interp::from_name(value)
                        .ok_or_else(|| self.error(format!("Unknown interpolation '{value}'")))?
                }
                _ => return Err(self.error(format!("Unknown attribute '{key}'"))),
            }
        }
        if var.location == u32::MAX {
            return Err(self.error("Missing location"));
        }
        if !(1..=4).contains(&var.components) {
            return Err(self.error(format!("Invalid component count {}", var.components)));
        }
        Ok(var)
    }

    fn parse_reg_decl(&mut self) -> PResult<RegDecl> {
        self.expect('$')?;
        let index = self.read_number()?;
        let mut reg = RegDecl {
            index,
            bit_size: 32,
            num_components: 1,
        };
        for (key, value) in self.read_line_attrs()? {
            match key {
                "bits" => reg.bit_size = self.attr_number(key, value)?,
                "components" => reg.num_components = self.attr_number(key, value)?,
                _ => return Err(self.error(format!("Unknown attribute '{key}'"))),
            }
        }
        self.check_shape(reg.bit_size, reg.num_components)?;
        Ok(reg)
    }

    fn check_shape(&self, bits: u32, components: u32) -> PResult<()> {
        if !matches!(bits, 8 | 16 | 32 | 64) {
            return Err(self.error(format!("Invalid bit size {bits}")));
        }
        if !(1..=4).contains(&components) || (bits == 64 && components != 1) {
            return Err(self.error(format!("Invalid component count {components} for {bits}-bit value")));
        }
        Ok(())
    }

    // ---- Control flow ----

    /// Parses statements up to a closing brace or EOF.
    ///
    /// The returned list starts and ends with a block and alternates blocks
    /// with structured nodes, the shape instruction selection walks.
    fn parse_cf_list(&mut self) -> PResult<Vec<CfNode>> {
        let mut list = Vec::new();
        let mut current: Vec<IrInstr> = Vec::new();

        loop {
            self.skip_whitespace(true);
            if self.is_eof() || self.current_char() == Some('}') {
                break;
            }
            if matches!(current.last(), Some(IrInstr::Jump(_))) {
                return Err(self.error("Jump must be the last instruction of its block"));
            }

            match self.peek_identifier() {
                Some("if") => {
                    self.read_identifier()?;
                    let node = self.parse_if()?;
                    list.push(CfNode::Block(std::mem::take(&mut current)));
                    list.push(node);
                }
                Some("loop") => {
                    self.read_identifier()?;
                    self.expect('{')?;
                    self.loop_depth += 1;
                    let body = self.parse_cf_list()?;
                    self.loop_depth -= 1;
                    self.expect('}')?;
                    list.push(CfNode::Block(std::mem::take(&mut current)));
                    list.push(CfNode::Loop { body });
                }
                Some(kw @ ("break" | "continue")) => {
                    self.read_identifier()?;
                    if self.loop_depth == 0 {
                        return Err(self.error(format!("'{kw}' outside of a loop")));
                    }
                    current.push(IrInstr::Jump(if kw == "break" {
                        JumpKind::Break
                    } else {
                        JumpKind::Continue
                    }));
                }
                _ => current.push(self.parse_instr()?),
            }
        }

        list.push(CfNode::Block(current));
        Ok(list)
    }

    fn parse_if(&mut self) -> PResult<CfNode> {
        let condition = self.parse_src()?;
        let mut dont_flatten = false;
        if self.try_read_inline('[') {
            for (key, _) in self.read_bracket_attrs()? {
                match key {
                    "dont_flatten" => dont_flatten = true,
                    _ => return Err(self.error(format!("Unknown if attribute '{key}'"))),
                }
            }
        }

        self.expect('{')?;
        let then_list = self.parse_cf_list()?;
        self.expect('}')?;

        let else_list = if self.peek_identifier() == Some("else") {
            self.read_identifier()?;
            self.expect('{')?;
            let list = self.parse_cf_list()?;
            self.expect('}')?;
            list
        } else {
            vec![CfNode::Block(Vec::new())]
        };

        Ok(CfNode::If {
            condition,
            then_list,
            else_list,
            dont_flatten,
        })
    }

    // ---- Instructions ----

    fn parse_instr(&mut self) -> PResult<IrInstr> {
        self.skip_whitespace(true);
        if self.current_char() == Some('@') {
            return self.parse_intrinsic(None);
        }

        let dest = self.parse_dest()?;
        self.expect('=')?;
        self.skip_whitespace(true);

        if self.current_char() == Some('@') {
            return self.parse_intrinsic(Some(dest));
        }

        let name = self.read_identifier()?;
        match name {
            "load_const" => self.parse_load_const(dest),
            "tex" => {
                self.expect('.')?;
                self.parse_tex(dest)
            }
            _ => {
                let op = AluKind::parse(name).ok_or_else(|| self.error(format!("Unknown ALU op '{name}'")))?;
                let mut srcs = Vec::new();
                for i in 0..op.num_srcs() {
                    if i > 0 {
                        self.expect(',')?;
                    }
                    srcs.push(self.parse_src()?);
                }
                Ok(IrInstr::Alu { op, dest, srcs })
            }
        }
    }

    fn parse_dest(&mut self) -> PResult<Dest> {
        self.skip_whitespace(true);
        match self.current_char() {
            Some('%') => {
                self.advance();
                let index = self.read_number()?;
                self.expect(':')?;
                let token = self.read_token();
                let (bits, components) = match token.split_once('x') {
                    Some((b, c)) => (b.parse::<u32>().ok(), c.parse::<u32>().ok()),
                    None => (token.parse::<u32>().ok(), Some(1)),
                };
                let (Some(bit_size), Some(num_components)) = (bits, components) else {
                    return Err(self.error(format!("Invalid value type '{token}'")));
                };
                self.check_shape(bit_size, num_components)?;

                let info = DefInfo {
                    bit_size,
                    num_components,
                };
                if self.shader.defs.insert(index, info).is_some() {
                    return Err(self.error(format!("Value %{index} defined twice")));
                }
                Ok(Dest {
                    value: Value::Ssa(index),
                    bit_size,
                    num_components,
                })
            }
            Some('$') => {
                self.advance();
                let index = self.read_number()?;
                let reg = self
                    .shader
                    .register(index)
                    .ok_or(ParseError::UndeclaredRegister(index))?;
                Ok(Dest {
                    value: Value::Reg(index),
                    bit_size: reg.bit_size,
                    num_components: reg.num_components,
                })
            }
            other => Err(self.error(format!("Expected destination but found {other:?}"))),
        }
    }

    fn parse_src(&mut self) -> PResult<Src> {
        let negate = self.try_read('-');
        let abs = self.try_read('|');
        self.skip_whitespace(true);

        let value = match self.current_char() {
            Some('%') => {
                self.advance();
                let index = self.read_number()?;
                self.uses.push(index);
                Value::Ssa(index)
            }
            Some('$') => {
                self.advance();
                let index = self.read_number()?;
                if self.shader.register(index).is_none() {
                    return Err(ParseError::UndeclaredRegister(index));
                }
                Value::Reg(index)
            }
            other => return Err(self.error(format!("Expected source but found {other:?}"))),
        };

        let mut swizzle = Vec::new();
        if self.current_char() == Some('.') {
            self.advance();
            while let Some(ch) = self.current_char() {
                let comp = match ch {
                    'x' => 0,
                    'y' => 1,
                    'z' => 2,
                    'w' => 3,
                    _ => break,
                };
                swizzle.push(comp);
                self.advance();
            }
            if swizzle.is_empty() {
                return Err(self.error("Empty swizzle"));
            }
        }

        if abs {
            self.expect('|')?;
        }
        Ok(Src {
            value,
            swizzle,
            negate,
            abs,
        })
    }

    fn parse_src_list(&mut self) -> PResult<Vec<Src>> {
        self.expect('(')?;
        let mut srcs = Vec::new();
        if self.try_read(')') {
            return Ok(srcs);
        }
        loop {
            srcs.push(self.parse_src()?);
            if self.try_read(')') {
                return Ok(srcs);
            }
            self.expect(',')?;
        }
    }

    fn parse_intrinsic(&mut self, dest: Option<Dest>) -> PResult<IrInstr> {
        self.expect('@')?;
        let name = self.read_identifier()?;
        let op = IntrinsicOp::from_name(name).ok_or_else(|| self.error(format!("Unknown intrinsic '{name}'")))?;
        let srcs = self.parse_src_list()?;
        if srcs.len() != op.num_srcs() {
            return Err(self.error(format!(
                "Intrinsic '{name}' takes {} sources, got {}",
                op.num_srcs(),
                srcs.len()
            )));
        }

        let mut indices = Indices::default();
        if self.try_read_inline('[') {
            for (key, value) in self.read_bracket_attrs()? {
                match key {
                    "base" => indices.base = Some(self.attr_number(key, value)?),
                    "component" => indices.component = Some(self.attr_number(key, value)?),
                    "location" => indices.location = Some(self.attr_number(key, value)?),
                    "desc_set" => indices.desc_set = Some(self.attr_number(key, value)?),
                    "binding" => indices.binding = Some(self.attr_number(key, value)?),
                    "texture" => indices.texture = Some(self.attr_number(key, value)?),
                    "id" => indices.id = Some(self.attr_number(key, value)?),
                    "dim" => {
                        indices.dim = Some(
                            Dim::from_name(value).ok_or_else(|| self.error(format!("Unknown dim '{value}'")))?,
                        )
                    }
                    "array" => indices.array = self.attr_number(key, value)? != 0,
                    "atomic" => {
                        indices.atomic = Some(
                            AtomicOp::from_name(value)
                                .ok_or_else(|| self.error(format!("Unknown atomic op '{value}'")))?,
                        )
                    }
                    "type" => {
                        indices.ty = Some(
                            BaseType::from_name(value).ok_or_else(|| self.error(format!("Unknown type '{value}'")))?,
                        )
                    }
                    _ => return Err(self.error(format!("Unknown index '{key}'"))),
                }
            }
        }

        Ok(IrInstr::Intrinsic {
            op,
            dest,
            srcs,
            indices,
        })
    }

    fn parse_load_const(&mut self, dest: Dest) -> PResult<IrInstr> {
        let mut values = Vec::new();
        if self.try_read('(') {
            loop {
                values.push(self.parse_literal(dest.bit_size)?);
                if self.try_read(')') {
                    break;
                }
                self.expect(',')?;
            }
        } else {
            values.push(self.parse_literal(dest.bit_size)?);
        }

        if values.len() != dest.num_components as usize {
            return Err(self.error(format!(
                "load_const has {} values for {} components",
                values.len(),
                dest.num_components
            )));
        }
        Ok(IrInstr::LoadConst { dest, values })
    }

    /// An integer or float literal as a `bits`-wide bit pattern.
    fn parse_literal(&mut self, bits: u32) -> PResult<u64> {
        self.skip_whitespace(true);
        let token = self.read_token();
        let (negative, body) = match token.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, token.strip_prefix('+').unwrap_or(token)),
        };
        let mask = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };

        let is_float = !body.starts_with("0x") && (body.contains('.') || body == "inf" || body == "nan");
        if is_float {
            let value: f64 = body
                .parse()
                .map_err(|_| self.error(format!("Invalid float literal '{token}'")))?;
            let value = if negative { -value } else { value };
            return match bits {
                32 => Ok((value as f32).to_bits() as u64),
                64 => Ok(value.to_bits()),
                _ => Err(self.error(format!("Float literal '{token}' needs a 32 or 64-bit value"))),
            };
        }

        let value = parse_u64(body).ok_or_else(|| self.error(format!("Invalid literal '{token}'")))?;
        if negative {
            return Ok((value as i64).wrapping_neg() as u64 & mask);
        }
        if value & !mask != 0 {
            return Err(self.error(format!("Literal '{token}' does not fit in {bits} bits")));
        }
        Ok(value)
    }

    fn parse_tex(&mut self, dest: Dest) -> PResult<IrInstr> {
        let name = self.read_identifier()?;
        let op = TexOp::from_name(name).ok_or_else(|| self.error(format!("Unknown texture op '{name}'")))?;

        self.expect('(')?;
        let mut srcs = Vec::new();
        if !self.try_read(')') {
            loop {
                let kind_name = self.read_identifier()?;
                let kind = TexSrcKind::from_name(kind_name)
                    .ok_or_else(|| self.error(format!("Unknown texture source '{kind_name}'")))?;
                self.expect('=')?;
                srcs.push((kind, self.parse_src()?));
                if self.try_read(')') {
                    break;
                }
                self.expect(',')?;
            }
        }

        let mut tex = TexInstr {
            op,
            dest,
            srcs,
            dim: Dim::D2,
            is_array: false,
            texture_index: 0,
            sampler_index: 0,
            component: 0,
            dest_type: BaseType::Float,
            point_sampler: false,
        };
        if self.try_read_inline('[') {
            for (key, value) in self.read_bracket_attrs()? {
                match key {
                    "dim" => {
                        tex.dim = Dim::from_name(value).ok_or_else(|| self.error(format!("Unknown dim '{value}'")))?
                    }
                    "texture" => tex.texture_index = self.attr_number(key, value)?,
                    "sampler" => tex.sampler_index = self.attr_number(key, value)?,
                    "array" => tex.is_array = self.attr_number(key, value)? != 0,
                    "component" => tex.component = self.attr_number(key, value)?,
                    "point_sampler" => tex.point_sampler = self.attr_number(key, value)? != 0,
                    "type" => {
                        tex.dest_type =
                            BaseType::from_name(value).ok_or_else(|| self.error(format!("Unknown type '{value}'")))?
                    }
                    _ => return Err(self.error(format!("Unknown texture attribute '{key}'"))),
                }
            }
        }
        Ok(IrInstr::Tex(tex))
    }
}

fn parse_u64(token: &str) -> Option<u64> {
    match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = r#"
; fragment shader adding two inputs
shader fs "simple"
decl_input location=32 components=2 interp=smooth
decl_reg $0 bits=32 components=1

%0:32x2 = @load_input() [location=32]
%1:32 = fadd %0.x, -%0.y
$0 = mov %1
@store_output($0) [base=0, component=0]
"#;

    #[test]
    fn test_parse_simple() {
        let shader = parse_ir(SIMPLE).unwrap();
        assert_eq!(shader.stage, Stage::Fragment);
        assert_eq!(shader.name, "simple");
        assert_eq!(shader.inputs.len(), 1);
        assert_eq!(shader.inputs[0].location, 32);
        assert_eq!(shader.def(0).unwrap().num_components, 2);
        assert_eq!(shader.body.len(), 1);

        let CfNode::Block(instrs) = &shader.body[0] else {
            panic!("expected a block");
        };
        assert_eq!(instrs.len(), 4);
        match &instrs[1] {
            IrInstr::Alu { op, srcs, .. } => {
                assert_eq!(*op, AluKind::Op(AluOpcode::Fadd));
                assert_eq!(srcs[0].comp(0), 0);
                assert!(srcs[1].negate);
                assert_eq!(srcs[1].comp(0), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cf_lists_alternate() {
        let text = r#"
shader cs "cf"
%0:32 = load_const 1
if %0 [dont_flatten] {
    loop {
        break
    }
} else {
    %1:32 = load_const 2
}
"#;
        let shader = parse_ir(text).unwrap();
        assert_eq!(shader.body.len(), 3);
        assert!(matches!(shader.body[0], CfNode::Block(ref b) if b.len() == 1));
        let CfNode::If {
            then_list,
            else_list,
            dont_flatten,
            ..
        } = &shader.body[1]
        else {
            panic!("expected if");
        };
        assert!(dont_flatten);
        assert_eq!(then_list.len(), 3);
        assert!(matches!(then_list[1], CfNode::Loop { .. }));
        assert_eq!(else_list.len(), 1);
        assert!(matches!(shader.body[2], CfNode::Block(ref b) if b.is_empty()));
    }

    #[test]
    fn test_literals() {
        let text = r#"
shader cs "lit"
%0:64 = load_const 0x123456789abcdef
%1:32x2 = load_const (1.0, -1)
%2:16 = load_const -2
"#;
        let shader = parse_ir(text).unwrap();
        let CfNode::Block(instrs) = &shader.body[0] else {
            panic!("expected a block");
        };
        assert_eq!(
            instrs[0],
            IrInstr::LoadConst {
                dest: Dest {
                    value: Value::Ssa(0),
                    bit_size: 64,
                    num_components: 1
                },
                values: vec![0x0123_4567_89ab_cdef],
            }
        );
        let IrInstr::LoadConst { values, .. } = &instrs[1] else {
            panic!("expected load_const");
        };
        assert_eq!(values, &[0x3f80_0000, 0xffff_ffff]);
        let IrInstr::LoadConst { values, .. } = &instrs[2] else {
            panic!("expected load_const");
        };
        assert_eq!(values, &[0xfffe]);
    }

    #[test]
    fn test_errors() {
        let undefined = "shader fs \"e\"\n%1:32 = fneg %0\n";
        assert_eq!(parse_ir(undefined), Err(ParseError::UndefinedValue(0)));

        let undeclared = "shader fs \"e\"\n$3 = mov $3\n";
        assert_eq!(parse_ir(undeclared), Err(ParseError::UndeclaredRegister(3)));

        let bad_op = "shader fs \"e\"\n%0:32 = load_const 0\n\n%1:32 = frobnicate %0\n";
        match parse_ir(bad_op) {
            Err(ParseError::Syntax { line, message }) => {
                assert_eq!(line, 4);
                assert!(message.contains("frobnicate"), "{message}");
            }
            other => panic!("unexpected {other:?}"),
        }

        let wide_vec = "shader fs \"e\"\n%0:64x2 = load_const (0, 0)\n";
        assert!(matches!(parse_ir(wide_vec), Err(ParseError::Syntax { .. })));

        let stray_break = "shader fs \"e\"\nbreak\n";
        assert!(matches!(parse_ir(stray_break), Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn test_print_roundtrip() {
        let text = r#"
shader fs "tex"
%0:32x2 = load_const (0.5, 0.25)
%1:32x4 = tex.tg4 (coord=%0) [dim=2d, texture=1, sampler=2, component=3]
%2:32 = fmin |%1.w|, %1.x
if %2 {
    @discard()
}
"#;
        let first = parse_ir(text).unwrap();
        let printed = first.to_string();
        let second = parse_ir(&printed).unwrap();
        assert_eq!(first, second, "{printed}");
    }
}
