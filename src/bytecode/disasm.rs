use crate::bytecode::{AddressNames, Operand, Program, Quad};
use std::collections::BTreeSet;
use std::fmt;

const RULE: &str = "════════════════════════════════════════";

/// Print a listing of the whole program to stdout.
pub fn print_program(program: &Program, names: &AddressNames) {
    print!("{}", Listing { program, names });
}

/// Render the program: constants, functions, then the numbered quads.
pub fn disassemble(program: &Program, names: &AddressNames) -> String {
    Listing { program, names }.to_string()
}

/// Numbered quad listing; jump targets are marked with `►`.
pub fn disassemble_quads(quads: &[Quad], names: &AddressNames) -> String {
    QuadListing { quads, names }.to_string()
}

struct Listing<'a> {
    program: &'a Program,
    names: &'a AddressNames,
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let program = self.program;

        section(f, &format!("constants ({})", program.constant_table.len()))?;
        for (address, constant) in &program.constant_table {
            writeln!(
                f,
                "  {:>6}  {:<7} {}",
                address,
                constant.ty,
                self.names.display(*address)
            )?;
        }
        writeln!(f)?;

        section(f, &format!("functions ({})", program.function_data.len()))?;
        for (id, data) in &program.function_data {
            let params: Vec<String> = data.param_types.iter().map(|t| t.to_string()).collect();
            let returns = match &data.return_type {
                Some(ty) => ty.to_string(),
                None => "Void".to_string(),
            };
            writeln!(
                f,
                "  {}({}) -> {}  @{}",
                id,
                params.join(", "),
                returns,
                data.start_quad
            )?;
        }
        writeln!(f)?;

        section(f, &format!("{} quads", program.quad_list.len()))?;
        write!(
            f,
            "{}",
            QuadListing {
                quads: &program.quad_list,
                names: self.names,
            }
        )
    }
}

struct QuadListing<'a> {
    quads: &'a [Quad],
    names: &'a AddressNames,
}

impl fmt::Display for QuadListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets = collect_jump_targets(self.quads);
        for (ip, quad) in self.quads.iter().enumerate() {
            let marker = if targets.contains(&ip) { "► " } else { "  " };
            writeln!(
                f,
                "{:04} {}{:<14} {:<12} {:<12} {}",
                ip,
                marker,
                quad.op.symbol(),
                format_operand(&quad.left, self.names),
                format_operand(&quad.right, self.names),
                format_operand(&quad.result, self.names)
            )?;
        }
        Ok(())
    }
}

fn section(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "{}", RULE)?;
    writeln!(f, " {}", title)?;
    writeln!(f, "{}", RULE)
}

fn collect_jump_targets(quads: &[Quad]) -> BTreeSet<usize> {
    quads.iter().filter_map(Quad::jump_target).collect()
}

fn format_operand(operand: &Option<Operand>, names: &AddressNames) -> String {
    match operand {
        None => "-".to_string(),
        Some(Operand::Addr(a)) => names.display(*a),
        Some(Operand::Ref(a)) => format!("&{}", names.display(*a)),
        Some(Operand::Deref(a)) => format!("*{}", names.display(*a)),
        Some(other) => other.to_string(),
    }
}
