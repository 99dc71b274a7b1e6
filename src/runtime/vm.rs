use crate::bytecode::ir::MAIN;
use crate::bytecode::{FunctionData, OpClass, OpCode, Operand, Program, Quad};
use crate::lang::{ScalarType, Segment, Value};
use crate::memory::{Heap, MemoryLayout, TypeRange};
use crate::runtime::context::ContextMemory;
use crate::runtime::runtime_error::{RuntimeError, RuntimeErrorKind};
use log::{debug, trace};
use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_call_depth: usize,
    pub max_steps: Option<usize>,
    /// Number of heap cells.
    pub heap_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 1000,
            max_steps: None,
            heap_size: 4096,
        }
    }
}

/// What the dispatcher does after an instruction.
enum Flow {
    Next,
    Jump(usize),
    Halt,
}

/// Where a virtual address lives at run time.
enum Slot {
    Global(TypeRange),
    Frame(TypeRange),
    Constant,
    Heap,
}

type Step<T> = Result<T, RuntimeErrorKind>;

pub struct VirtualMachine<R: BufRead, W: Write> {
    config: VmConfig,
    input: R,
    output: W,

    layout: MemoryLayout,
    quads: Vec<Quad>,
    functions: BTreeMap<String, FunctionData>,
    constants: BTreeMap<usize, Value>,

    global: ContextMemory,
    contexts: Vec<ContextMemory>,
    /// Frames reserved by `ARE` and not yet entered.
    pending: Vec<ContextMemory>,
    returns: Vec<usize>,
    pending_return: Option<Value>,
    heap: Heap,

    ip: usize,
    steps: usize,
}

impl VirtualMachine<BufReader<Stdin>, Stdout> {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self::with_io(config, BufReader::new(io::stdin()), io::stdout())
    }
}

impl Default for VirtualMachine<BufReader<Stdin>, Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: BufRead, W: Write> VirtualMachine<R, W> {
    pub fn with_io(config: VmConfig, input: R, output: W) -> Self {
        let layout = MemoryLayout::default();
        let heap = Heap::new(layout.heap_start(), config.heap_size);
        VirtualMachine {
            config,
            input,
            output,
            layout,
            quads: Vec::new(),
            functions: BTreeMap::new(),
            constants: BTreeMap::new(),
            global: ContextMemory::new("<global>", &Default::default()),
            contexts: Vec::new(),
            pending: Vec::new(),
            returns: Vec::new(),
            pending_return: None,
            heap,
            ip: 0,
            steps: 0,
        }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Number of active frames, `main` included.
    pub fn frame_depth(&self) -> usize {
        self.contexts.len()
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    // ─── loading ──────────────────────────────────────────────────────────

    fn load(&mut self, program: &Program) -> Step<usize> {
        let layout = program.memory_layout();
        if layout.heap_start() != program.heap_start {
            return Err(RuntimeErrorKind::Internal(format!(
                "heap start {} does not match the layout ({})",
                program.heap_start,
                layout.heap_start()
            )));
        }
        let Some(main) = program.main() else {
            return Err(RuntimeErrorKind::Internal(
                "program has no main function".to_string(),
            ));
        };

        self.heap = Heap::new(layout.heap_start(), self.config.heap_size);
        self.layout = layout;
        self.quads = program.quad_list.clone();
        self.functions = program.function_data.clone();
        self.constants = program
            .constant_table
            .iter()
            .map(|(address, constant)| (*address, constant.value.clone()))
            .collect();
        self.global = ContextMemory::new("<global>", &program.globals);
        self.contexts = vec![ContextMemory::new(MAIN, &main.slot_counts)];
        self.pending.clear();
        self.returns.clear();
        self.pending_return = None;
        self.steps = 0;
        Ok(main.start_quad)
    }

    // ─── main loop ────────────────────────────────────────────────────────

    /// Execute `program` from `main` until its final `ENDFUNC`.
    pub fn run(&mut self, program: &Program) -> Result<(), RuntimeError> {
        let start = self.load(program).map_err(|kind| self.error(kind))?;
        self.ip = start;
        debug!("running {} quads from {}", self.quads.len(), self.ip);

        loop {
            let flow = self.step().map_err(|kind| self.error(kind))?;
            match flow {
                Flow::Next => self.ip += 1,
                Flow::Jump(target) => self.ip = target,
                Flow::Halt => break,
            }
        }

        self.output.flush().map_err(|e| self.error(e.into()))?;
        debug!("halted after {} steps", self.steps);
        Ok(())
    }

    fn error(&self, kind: RuntimeErrorKind) -> RuntimeError {
        let mut err = RuntimeError::new(kind, self.ip);
        for ctx in &self.contexts {
            err = err.with_context(ctx.function());
        }
        err
    }

    fn check_limits(&mut self) -> Step<()> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeErrorKind::StepLimitExceeded(max));
            }
        }
        Ok(())
    }

    fn step(&mut self) -> Step<Flow> {
        let Some(quad) = self.quads.get(self.ip).cloned() else {
            return Err(RuntimeErrorKind::Internal(format!(
                "instruction pointer {} outside the program",
                self.ip
            )));
        };
        self.check_limits()?;
        trace!("{:04} {}", self.ip, quad);

        let Some(class) = quad.op.class() else {
            return Err(RuntimeErrorKind::UnknownOpcode(quad.op));
        };
        match class {
            OpClass::Arithmetic => self.exec_arithmetic(&quad),
            OpClass::Boolean => self.exec_boolean(&quad),
            OpClass::Assignment => self.exec_assign(&quad),
            OpClass::PointerArithmetic => self.exec_pointer(&quad),
            OpClass::Array => self.exec_verify(&quad),
            OpClass::Jump => self.exec_jump(&quad),
            OpClass::BuiltIn => self.exec_builtin(&quad),
            OpClass::Function => self.exec_function(&quad),
        }
    }

    // ─── memory ───────────────────────────────────────────────────────────

    fn classify(&self, address: usize) -> Step<Slot> {
        if address >= self.layout.heap_start() {
            return if self.heap.contains(address) {
                Ok(Slot::Heap)
            } else {
                Err(RuntimeErrorKind::InvalidAddress { address })
            };
        }
        let Some(range) = self.layout.locate(address) else {
            return Err(RuntimeErrorKind::InvalidAddress { address });
        };
        Ok(match range.segment {
            Segment::Global => Slot::Global(*range),
            Segment::Local | Segment::Temporary => Slot::Frame(*range),
            Segment::Constant => Slot::Constant,
        })
    }

    fn frame(&self) -> Step<&ContextMemory> {
        self.contexts
            .last()
            .ok_or_else(|| RuntimeErrorKind::Internal("no active frame".to_string()))
    }

    /// Declared type of a segment address; heap cells are untyped.
    fn declared_type(&self, address: usize) -> Option<ScalarType> {
        self.layout.locate(address).map(|r| r.ty)
    }

    fn read_slot(&self, address: usize) -> Step<Option<Value>> {
        let slot = match self.classify(address)? {
            Slot::Global(range) => self.global.get(&range, address).cloned(),
            Slot::Frame(range) => self.frame()?.get(&range, address).cloned(),
            Slot::Constant => Some(self.constants.get(&address).cloned()),
            Slot::Heap => Some(self.heap.read(address)?.cloned()),
        };
        slot.ok_or(RuntimeErrorKind::InvalidAddress { address })
    }

    fn write_slot(&mut self, address: usize, value: Option<Value>) -> Step<()> {
        let value = match (value, self.declared_type(address)) {
            (Some(v), Some(ty)) => match v.coerce_to(ty) {
                Some(v) => Some(v),
                None => {
                    return Err(RuntimeErrorKind::TypeError(format!(
                        "cannot store a value in {} slot {}",
                        ty, address
                    )));
                }
            },
            (value, _) => value,
        };

        let stored = match self.classify(address)? {
            Slot::Global(range) => self.global.set(&range, address, value),
            Slot::Frame(range) => match self.contexts.last_mut() {
                Some(ctx) => ctx.set(&range, address, value),
                None => false,
            },
            Slot::Constant => {
                return Err(RuntimeErrorKind::Internal(format!(
                    "write to constant {}",
                    address
                )));
            }
            Slot::Heap => {
                match value {
                    Some(v) => self.heap.write(address, v)?,
                    None => self.heap.clear(address)?,
                }
                true
            }
        };
        if stored {
            Ok(())
        } else {
            Err(RuntimeErrorKind::InvalidAddress { address })
        }
    }

    fn read_value(&self, address: usize) -> Step<Value> {
        self.read_slot(address)?
            .ok_or(RuntimeErrorKind::UninitializedValue { address })
    }

    /// The address stored in pointer slot `address`.
    fn pointer_at(&self, address: usize) -> Step<usize> {
        match self.read_slot(address)? {
            Some(Value::Pointer(target)) => Ok(target),
            None => Err(RuntimeErrorKind::NullPointerDereference { address }),
            Some(other) => Err(RuntimeErrorKind::TypeError(format!(
                "expected a pointer at {}, found {}",
                address,
                other.scalar_type()
            ))),
        }
    }

    /// The slot an operand designates.
    fn resolve(&self, operand: &Option<Operand>) -> Step<usize> {
        match operand {
            Some(Operand::Addr(a)) | Some(Operand::Ref(a)) => Ok(*a),
            Some(Operand::Deref(a)) => self.pointer_at(*a),
            other => Err(RuntimeErrorKind::Internal(format!(
                "operand {:?} does not name a slot",
                other
            ))),
        }
    }

    fn read(&self, operand: &Option<Operand>) -> Step<Value> {
        match operand {
            Some(Operand::Immediate(n)) => Ok(Value::Int(*n as i64)),
            other => self.read_value(self.resolve(other)?),
        }
    }

    fn write(&mut self, operand: &Option<Operand>, value: Value) -> Step<()> {
        let address = self.resolve(operand)?;
        self.write_slot(address, Some(value))
    }

    fn read_int(&self, operand: &Option<Operand>) -> Step<i64> {
        match self.read(operand)? {
            Value::Int(n) => Ok(n),
            other => Err(RuntimeErrorKind::TypeError(format!(
                "expected Int, found {}",
                other.scalar_type()
            ))),
        }
    }

    fn read_bool(&self, operand: &Option<Operand>) -> Step<bool> {
        match self.read(operand)? {
            Value::Bool(b) => Ok(b),
            other => Err(RuntimeErrorKind::TypeError(format!(
                "expected Bool, found {}",
                other.scalar_type()
            ))),
        }
    }

    // ─── arithmetic & logic ───────────────────────────────────────────────

    fn exec_arithmetic(&mut self, quad: &Quad) -> Step<Flow> {
        let left = self.read(&quad.left)?;
        let right = self.read(&quad.right)?;
        let target = self.resolve(&quad.result)?;

        let value = match self.declared_type(target) {
            Some(ScalarType::Int) => {
                let (Value::Int(a), Value::Int(b)) = (&left, &right) else {
                    return Err(RuntimeErrorKind::TypeError(format!(
                        "integer {} on {} and {}",
                        quad.op,
                        left.scalar_type(),
                        right.scalar_type()
                    )));
                };
                Value::Int(int_op(quad.op, *a, *b)?)
            }
            Some(ScalarType::Float) => {
                let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
                    return Err(RuntimeErrorKind::TypeError(format!(
                        "float {} on {} and {}",
                        quad.op,
                        left.scalar_type(),
                        right.scalar_type()
                    )));
                };
                Value::Float(float_op(quad.op, a, b)?)
            }
            other => {
                return Err(RuntimeErrorKind::TypeError(format!(
                    "arithmetic result stored in {:?} slot",
                    other
                )));
            }
        };
        self.write_slot(target, Some(value))?;
        Ok(Flow::Next)
    }

    fn exec_boolean(&mut self, quad: &Quad) -> Step<Flow> {
        let left = self.read(&quad.left)?;
        let right = self.read(&quad.right)?;

        let result = match quad.op {
            OpCode::And | OpCode::Or => match (&left, &right) {
                (Value::Bool(a), Value::Bool(b)) => {
                    if quad.op == OpCode::And {
                        *a && *b
                    } else {
                        *a || *b
                    }
                }
                _ => {
                    return Err(RuntimeErrorKind::TypeError(format!(
                        "{} on {} and {}",
                        quad.op,
                        left.scalar_type(),
                        right.scalar_type()
                    )));
                }
            },
            op => compare(op, &left, &right)?,
        };
        self.write(&quad.result, Value::Bool(result))?;
        Ok(Flow::Next)
    }

    fn exec_assign(&mut self, quad: &Quad) -> Step<Flow> {
        let value = self.read(&quad.left)?;
        self.write(&quad.result, value)?;
        Ok(Flow::Next)
    }

    // ─── pointers & arrays ────────────────────────────────────────────────

    fn exec_pointer(&mut self, quad: &Quad) -> Step<Flow> {
        match quad.op {
            OpCode::PointerAdd => {
                let base = match &quad.left {
                    Some(Operand::Immediate(n)) => *n,
                    Some(Operand::Addr(a)) | Some(Operand::Ref(a)) => self.pointer_at(*a)?,
                    Some(Operand::Deref(a)) => self.pointer_at(self.pointer_at(*a)?)?,
                    other => {
                        return Err(RuntimeErrorKind::Internal(format!(
                            "bad pointer base {:?}",
                            other
                        )));
                    }
                };
                let offset = self.read_int(&quad.right)?;
                let address = usize::try_from(offset)
                    .ok()
                    .and_then(|o| base.checked_add(o))
                    .ok_or(RuntimeErrorKind::InvalidAddress { address: base })?;
                self.write(&quad.result, Value::Pointer(address))?;
            }
            OpCode::PointerAssign => {
                let value = match &quad.left {
                    Some(Operand::AllocHeap) => {
                        let size = match &quad.right {
                            Some(Operand::Immediate(n)) => *n,
                            other => {
                                return Err(RuntimeErrorKind::Internal(format!(
                                    "bad heap size {:?}",
                                    other
                                )));
                            }
                        };
                        Some(Value::Pointer(self.heap.allocate(size)?))
                    }
                    source => {
                        let address = self.resolve(source)?;
                        self.read_slot(address)?
                    }
                };
                if let Some(other) = value
                    .as_ref()
                    .filter(|v| v.scalar_type() != ScalarType::Pointer)
                {
                    return Err(RuntimeErrorKind::TypeError(format!(
                        "pointer assignment of {}",
                        other.scalar_type()
                    )));
                }
                let target = self.resolve(&quad.result)?;
                self.write_slot(target, value)?;
            }
            OpCode::DeleteRef => {
                let slot = self.resolve(&quad.result)?;
                let reference = self.pointer_at(slot)?;
                let released = self.heap.release_recursive(reference)?;
                debug!("released {} block(s) from {}", released, reference);
                self.write_slot(slot, None)?;
            }
            op => return Err(RuntimeErrorKind::UnknownOpcode(op)),
        }
        Ok(Flow::Next)
    }

    fn exec_verify(&mut self, quad: &Quad) -> Step<Flow> {
        let index = self.read_int(&quad.left)?;
        let size = self.read_int(&quad.result)?;
        if index < 0 || index >= size {
            return Err(RuntimeErrorKind::ArrayIndexOutOfRange { index, size });
        }
        Ok(Flow::Next)
    }

    // ─── control ──────────────────────────────────────────────────────────

    fn exec_jump(&mut self, quad: &Quad) -> Step<Flow> {
        let Some(target) = quad.jump_target() else {
            return Err(RuntimeErrorKind::Internal("unpatched jump".to_string()));
        };
        match quad.op {
            OpCode::Goto => Ok(Flow::Jump(target)),
            _ if self.read_bool(&quad.left)? => Ok(Flow::Next),
            _ => Ok(Flow::Jump(target)),
        }
    }

    fn exec_builtin(&mut self, quad: &Quad) -> Step<Flow> {
        match quad.op {
            OpCode::Print => {
                let value = self.read(&quad.result)?;
                writeln!(self.output, "{}", value)?;
            }
            OpCode::Input => {
                let target = self.resolve(&quad.result)?;
                let Some(ty) = self.declared_type(target) else {
                    return Err(RuntimeErrorKind::TypeError(
                        "input into an untyped cell".to_string(),
                    ));
                };
                self.output.flush()?;
                let mut line = String::new();
                if self.input.read_line(&mut line)? == 0 {
                    return Err(RuntimeErrorKind::Io("unexpected end of input".to_string()));
                }
                let Some(value) = Value::parse_as(&line, ty) else {
                    return Err(RuntimeErrorKind::InvalidInput {
                        expected: ty,
                        text: line.trim_end().to_string(),
                    });
                };
                self.write_slot(target, Some(value))?;
            }
            op => return Err(RuntimeErrorKind::UnknownOpcode(op)),
        }
        Ok(Flow::Next)
    }

    fn function_data(&self, operand: &Option<Operand>) -> Step<(String, &FunctionData)> {
        let Some(Operand::Function(id)) = operand else {
            return Err(RuntimeErrorKind::Internal(format!(
                "expected a function operand, found {:?}",
                operand
            )));
        };
        match self.functions.get(id) {
            Some(data) => Ok((id.clone(), data)),
            None => Err(RuntimeErrorKind::Internal(format!("unknown function '{}'", id))),
        }
    }

    fn exec_function(&mut self, quad: &Quad) -> Step<Flow> {
        match quad.op {
            OpCode::Are => {
                let (id, data) = self.function_data(&quad.left)?;
                let frame = ContextMemory::new(&id, &data.slot_counts);
                self.pending.push(frame);
                Ok(Flow::Next)
            }
            OpCode::Param => {
                let value = self.read(&quad.left)?;
                let Some(Operand::Immediate(index)) = quad.result.clone() else {
                    return Err(RuntimeErrorKind::Internal("PARAM without index".to_string()));
                };
                let Some(frame) = self.pending.last() else {
                    return Err(RuntimeErrorKind::Internal("PARAM without ARE".to_string()));
                };
                let address = self
                    .functions
                    .get(frame.function())
                    .and_then(|data| data.param_addresses.get(index))
                    .copied()
                    .ok_or_else(|| {
                        RuntimeErrorKind::Internal(format!("no parameter {}", index))
                    })?;
                let Some(range) = self.layout.locate(address).copied() else {
                    return Err(RuntimeErrorKind::InvalidAddress { address });
                };
                let Some(value) = value.coerce_to(range.ty) else {
                    return Err(RuntimeErrorKind::TypeError(format!(
                        "argument {} does not fit a {} parameter",
                        index, range.ty
                    )));
                };
                let stored = match self.pending.last_mut() {
                    Some(frame) => frame.set(&range, address, Some(value)),
                    None => false,
                };
                if stored {
                    Ok(Flow::Next)
                } else {
                    Err(RuntimeErrorKind::InvalidAddress { address })
                }
            }
            OpCode::GoSub => {
                let (id, data) = self.function_data(&quad.left)?;
                let start = data.start_quad;
                if self.contexts.len() >= self.config.max_call_depth {
                    return Err(RuntimeErrorKind::CallDepthExceeded(self.config.max_call_depth));
                }
                let Some(frame) = self.pending.pop() else {
                    return Err(RuntimeErrorKind::Internal("GOSUB without ARE".to_string()));
                };
                trace!("call {} from {}", id, self.ip);
                // drop the result of any discarded call
                self.pending_return = None;
                self.contexts.push(frame);
                self.returns.push(self.ip + 1);
                Ok(Flow::Jump(start))
            }
            OpCode::Return => {
                self.pending_return = Some(self.read(&quad.result)?);
                Ok(Flow::Next)
            }
            OpCode::EndFunc => {
                self.contexts.pop();
                match self.returns.pop() {
                    Some(ip) => Ok(Flow::Jump(ip)),
                    None => Ok(Flow::Halt),
                }
            }
            OpCode::CallAssign => {
                let Some(value) = self.pending_return.take() else {
                    let function = match &quad.left {
                        Some(Operand::Function(id)) => id.clone(),
                        _ => String::from("<unknown>"),
                    };
                    return Err(RuntimeErrorKind::MissingReturn { function });
                };
                self.write(&quad.result, value)?;
                Ok(Flow::Next)
            }
            op => Err(RuntimeErrorKind::UnknownOpcode(op)),
        }
    }
}

fn int_op(op: OpCode, a: i64, b: i64) -> Step<i64> {
    let result = match op {
        OpCode::Add => a.checked_add(b),
        OpCode::Subtract => a.checked_sub(b),
        OpCode::Multiply => a.checked_mul(b),
        OpCode::Divide => {
            if b == 0 {
                return Err(RuntimeErrorKind::DivisionByZero);
            }
            a.checked_div(b)
        }
        other => return Err(RuntimeErrorKind::UnknownOpcode(other)),
    };
    result.ok_or_else(|| {
        RuntimeErrorKind::TypeError(format!("integer overflow in {} {} {}", a, op, b))
    })
}

fn float_op(op: OpCode, a: f64, b: f64) -> Step<f64> {
    match op {
        OpCode::Add => Ok(a + b),
        OpCode::Subtract => Ok(a - b),
        OpCode::Multiply => Ok(a * b),
        OpCode::Divide if b == 0.0 => Err(RuntimeErrorKind::DivisionByZero),
        OpCode::Divide => Ok(a / b),
        other => Err(RuntimeErrorKind::UnknownOpcode(other)),
    }
}

fn compare(op: OpCode, left: &Value, right: &Value) -> Step<bool> {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Pointer(a), Value::Pointer(b)) => Some(a.cmp(b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(RuntimeErrorKind::TypeError(format!(
                    "cannot compare {} with {}",
                    left.scalar_type(),
                    right.scalar_type()
                )));
            }
        },
    };

    // NaN compares unequal to everything
    let Some(ordering) = ordering else {
        return Ok(op == OpCode::NotEqual);
    };
    Ok(match op {
        OpCode::Equal => ordering == Ordering::Equal,
        OpCode::NotEqual => ordering != Ordering::Equal,
        OpCode::LessThan => ordering == Ordering::Less,
        OpCode::GreaterThan => ordering == Ordering::Greater,
        OpCode::LessEqual => ordering != Ordering::Greater,
        OpCode::GreaterEqual => ordering != Ordering::Less,
        other => return Err(RuntimeErrorKind::UnknownOpcode(other)),
    })
}
