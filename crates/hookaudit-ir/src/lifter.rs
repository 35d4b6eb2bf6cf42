//! Lifts a parsed [`crate::yul`] object into a [`Contract`].
//!
//! solc's `--ir` output always has the same two-level shape: an outer object holding
//! the constructor's code plus one nested `_deployed` object holding the runtime
//! code, each a flat `code { ... }` block with Yul `function` definitions alongside
//! inline dispatcher logic. This module turns that into one [`Function`] per Yul
//! function definition (plus one synthetic function per object's top-level code) and
//! lowers each function body into a control-flow graph of [`BasicBlock`]s.
//!
//! Yul's structured control flow (`if`/`switch`/`for`, no `goto`) is always reducible,
//! so SSA values for mutated locals can be built by threading an environment of
//! `name -> ValueRef` bindings through the lowering and inserting a [`PhiInst`] at
//! every syntactic join point, rather than computing dominance frontiers the way a
//! general CFG would need.

use std::collections::HashMap;

use primitive_types::U256;

use crate::{
    basic_block::{BasicBlock, BasicBlockId},
    constant::ConstantKind,
    contract::Contract,
    error::{HookauditError, Result},
    function::{Function, FunctionId, FunctionType, MutabilityInfo},
    id_arena::IdGroup,
    instruction::{
        BranchInst, CallInst, Instruction, InstKind, PhiIncoming, PhiInst, ReturnInst, SourceMap, SwitchInst, YulFuncInst,
    },
    value::{Argument, NodeId, ValueRef},
    yul,
};

/// Maps a byte offset in the raw Yul text back to the `///@src <file>:<start>:<len>`
/// comment covering it, mirroring how `value.py`'s `_try_to_get_comment` scans
/// backward through the source for the nearest preceding `///@src` line.
struct SourceMapIndex {
    /// `(offset, source_map)` pairs, sorted ascending by `offset`: the byte offset
    /// immediately following the comment line, paired with the source map it
    /// introduces. A lookup finds the last entry at or before the queried offset.
    entries: Vec<(usize, SourceMap)>,
}

impl SourceMapIndex {
    fn build(src: &str) -> Self {
        let mut entries = Vec::new();
        let mut offset = 0usize;
        for line in src.split_inclusive('\n') {
            if let Some(sm) = line.trim_start().strip_prefix("///@src").and_then(parse_src_comment) {
                entries.push((offset + line.len(), sm));
            }
            offset += line.len();
        }
        Self { entries }
    }

    fn lookup(&self, token_offset: usize) -> Option<SourceMap> {
        let idx = self.entries.partition_point(|(at, _)| *at <= token_offset);
        idx.checked_sub(1).map(|i| self.entries[i].1)
    }
}

/// Parses the `<file>:<start>:<len>` payload of a `///@src` comment (anything after
/// the leading whitespace is ignored).
fn parse_src_comment(rest: &str) -> Option<SourceMap> {
    let mut parts = rest.trim().splitn(3, ':');
    let file_index: u32 = parts.next()?.parse().ok()?;
    let start: u32 = parts.next()?.parse().ok()?;
    let len: u32 = parts.next()?.split_whitespace().next()?.parse().ok()?;
    Some(SourceMap { file_index, start, len })
}

/// Lifts a full compilation unit: the outer object is the constructor, its first
/// nested object is the runtime code. Matches `uniscan`'s own assumption that solc's
/// combined-json/standard-json `ir` output has exactly this shape for a contract that
/// compiled successfully.
pub fn lift(name: &str, object: &yul::Object, src: &str) -> Result<Contract> {
    let source_index = SourceMapIndex::build(src);
    let mut contract = Contract::new(name);
    lift_code_object(&mut contract, object, false, &source_index)?;
    if let Some(runtime) = object.children.first() {
        lift_code_object(&mut contract, runtime, true, &source_index)?;
    }
    discover_dispatcher(&mut contract)?;
    Ok(contract)
}

fn lift_code_object(contract: &mut Contract, object: &yul::Object, is_runtime: bool, source_index: &SourceMapIndex) -> Result<()> {
    let mut defs = Vec::new();
    collect_function_defs(&object.code, &mut defs);

    let id_group = contract.id_group.clone();
    let mut table = HashMap::new();
    for def in &defs {
        table.insert(def.name.clone(), FunctionId(NodeId(id_group.alloc())));
    }

    for def in &defs {
        let func_id = table[&def.name];
        lift_function(contract, &id_group, &table, func_id, def, is_runtime, source_index)?;
    }

    let main_name = if is_runtime { "__runtime_dispatch" } else { "__creation_main" };
    let main_kind = if is_runtime { FunctionType::Runtime } else { FunctionType::Creation };
    let main_id = FunctionId(NodeId(id_group.alloc()));
    lift_body(
        contract,
        &id_group,
        &table,
        main_id,
        main_name,
        main_kind,
        is_runtime,
        &[],
        &[],
        &object.code,
        source_index,
    )?;

    Ok(())
}

/// Walks the runtime dispatcher's top-level `switch` (the one lowered from
/// `__runtime_dispatch`'s body) and assigns each case's selector onto the external
/// function it ultimately jumps to, mirroring `visitSwitch`'s dispatcher-building code
/// in the source this crate's detectors were ported from.
fn discover_dispatcher(contract: &mut Contract) -> Result<()> {
    let Some(dispatch_fn) = contract.runtime_functions.get("__runtime_dispatch") else {
        return Ok(());
    };
    let Some(entry) = dispatch_fn.entry_point else {
        return Ok(());
    };
    let Some(bb) = contract.basic_blocks.get(&entry) else {
        return Ok(());
    };
    let Some(InstKind::Switch(switch)) = bb.terminator().map(|inst| &inst.kind) else {
        return Ok(());
    };
    let cases = switch.cases.clone();

    for (value, target) in cases {
        let selector = value.low_u32();
        let func_id = resolve_dispatch_target(contract, target)?;
        if let Some(func) = contract.function_mut(func_id) {
            func.selector = Some(selector);
        }
    }
    Ok(())
}

/// Follows a dispatcher case's "trivial chain" of unconditional jumps down to the
/// block that actually calls the external function, and returns that function,
/// mirroring `_get_external_func_from_dispatcher`.
fn resolve_dispatch_target(contract: &Contract, target: BasicBlockId) -> Result<FunctionId> {
    let bb = contract
        .basic_blocks
        .get(&target)
        .ok_or_else(|| HookauditError::UnsupportedYul("dispatcher case targets a missing block".to_string()))?;

    if bb.instructions.len() == 1 {
        if let InstKind::Branch(BranchInst {
            condition: None,
            true_target,
            ..
        }) = bb.instructions[0].kind
        {
            return resolve_dispatch_target(contract, true_target);
        }
    }

    if matches!(
        bb.terminator().map(|inst| &inst.kind),
        Some(InstKind::Branch(BranchInst { condition: Some(_), .. }))
    ) {
        return Err(HookauditError::UnsupportedYul(
            "dispatcher case has conditional control flow (library-style dispatch is unsupported)".to_string(),
        ));
    }

    if bb.instructions.len() != 2 {
        return Err(HookauditError::UnsupportedYul(format!(
            "dispatcher case block has an unexpected shape ({} instructions)",
            bb.instructions.len()
        )));
    }
    let InstKind::Call(CallInst { callee, .. }) = &bb.instructions[0].kind else {
        return Err(HookauditError::UnsupportedYul(
            "dispatcher case block's first instruction is not a call".to_string(),
        ));
    };
    let callee_fn = contract
        .function(*callee)
        .ok_or_else(|| HookauditError::UnsupportedYul("dispatcher case calls an unknown function".to_string()))?;
    if !matches!(callee_fn.kind, FunctionType::External) {
        return Err(HookauditError::UnsupportedYul(format!(
            "dispatcher case calls {:?}, which is not an external function",
            callee_fn.name
        )));
    }
    Ok(*callee)
}

fn collect_function_defs<'a>(block: &'a yul::Block, out: &mut Vec<&'a yul::FunctionDefinition>) {
    for stmt in &block.statements {
        match stmt {
            yul::Statement::FunctionDefinition(def) => {
                collect_function_defs(&def.body, out);
                out.push(def);
            }
            yul::Statement::Block(b) => collect_function_defs(b, out),
            yul::Statement::If { body, .. } => collect_function_defs(body, out),
            yul::Statement::Switch { cases, .. } => {
                for case in cases {
                    collect_function_defs(&case.body, out);
                }
            }
            yul::Statement::ForLoop { init, post, body, .. } => {
                collect_function_defs(init, out);
                collect_function_defs(post, out);
                collect_function_defs(body, out);
            }
            _ => {}
        }
    }
}

/// `solc` names a contract's synthetic fallback/receive function `fun__<astId>`
/// (double underscore, no base name) unless it's one of that function's own inner
/// helpers, which get an `_inner` suffix instead.
fn is_fallback_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("fun__") else {
        return false;
    };
    rest.starts_with(|c: char| c.is_ascii_digit()) && !name.ends_with("inner")
}

/// Classifies a lifted function by its Yul name, in the precedence order solc's own
/// naming convention requires: the more specific prefixes first, `fun_`/`usr` only
/// once every special case has been ruled out.
fn classify(name: &str) -> FunctionType {
    if name.starts_with("constructor_") {
        FunctionType::Constructor
    } else if name.starts_with("external_fun_") {
        FunctionType::External
    } else if name.starts_with("getter_fun_") {
        FunctionType::Getter
    } else if name.starts_with("modifier_") {
        FunctionType::Modifier
    } else if is_fallback_name(name) {
        FunctionType::Fallback
    } else if name.starts_with("fun_") || name.starts_with("usr") {
        FunctionType::Internal
    } else if name.starts_with("constant_") {
        FunctionType::Constant
    } else {
        FunctionType::YulFunction
    }
}

#[allow(clippy::too_many_arguments)]
fn lift_function(
    contract: &mut Contract,
    id_group: &IdGroup,
    table: &HashMap<String, FunctionId>,
    func_id: FunctionId,
    def: &yul::FunctionDefinition,
    is_runtime: bool,
    source_index: &SourceMapIndex,
) -> Result<()> {
    let kind = classify(&def.name);
    lift_body(
        contract,
        id_group,
        table,
        func_id,
        &def.name,
        kind,
        is_runtime,
        &def.params,
        &def.returns,
        &def.body,
        source_index,
    )
}

#[allow(clippy::too_many_arguments)]
fn lift_body(
    contract: &mut Contract,
    id_group: &IdGroup,
    table: &HashMap<String, FunctionId>,
    func_id: FunctionId,
    name: &str,
    kind: FunctionType,
    is_runtime: bool,
    params: &[yul::TypedName],
    returns: &[yul::TypedName],
    body: &yul::Block,
    source_index: &SourceMapIndex,
) -> Result<()> {
    let mut builder = FuncBuilder {
        id_group: id_group.clone(),
        function_id: func_id,
        table,
        blocks: HashMap::new(),
        source_index,
    };

    let entry = builder.new_block();
    let mut env = Env::default();
    let mut arguments = Vec::with_capacity(params.len());
    for (index, param) in params.iter().enumerate() {
        let id = NodeId(builder.id_group.alloc());
        arguments.push(Argument {
            id,
            name: param.name.clone(),
            index,
        });
        env.bind(&param.name, ValueRef::Argument(id));
    }
    for ret in returns {
        let zero = builder.constant(contract, ConstantKind::Int(U256::zero()));
        env.bind(&ret.name, zero);
    }

    let end = builder.lower_block(contract, body, entry, env)?;
    if !end.terminated {
        let values = returns.iter().map(|r| end.env.get(&r.name)).collect();
        builder.set_terminator(end.block, InstKind::Return(ReturnInst { values }));
    }

    let basic_blocks: Vec<BasicBlockId> = builder.blocks.keys().copied().collect();
    let blocks: Vec<BasicBlock> = builder.blocks.into_values().collect();
    let function = Function {
        id: func_id,
        name: name.to_string(),
        kind,
        selector: None,
        is_runtime,
        arguments,
        return_names: returns.iter().map(|r| r.name.clone()).collect(),
        entry_point: Some(entry),
        basic_blocks,
        mutability: MutabilityInfo::default(),
    };
    contract.insert_function(function, blocks);
    Ok(())
}

#[derive(Default, Clone)]
struct Env {
    vars: HashMap<String, ValueRef>,
}

impl Env {
    fn bind(&mut self, name: &str, value: ValueRef) {
        self.vars.insert(name.to_string(), value);
    }

    fn get(&self, name: &str) -> ValueRef {
        self.vars
            .get(name)
            .copied()
            .unwrap_or(ValueRef::Constant(NodeId(crate::id_arena::Id(u32::MAX))))
    }
}

/// Where control reached after lowering a statement sequence: the open basic block to
/// keep appending to, the bindings live there, and whether that block already ends in
/// a terminator (a `return`/`break`/`continue`/`leave` was lowered into it, so nothing
/// more should be appended).
struct FlowEnd {
    block: BasicBlockId,
    env: Env,
    terminated: bool,
}

struct FuncBuilder<'a> {
    id_group: IdGroup,
    function_id: FunctionId,
    table: &'a HashMap<String, FunctionId>,
    blocks: HashMap<BasicBlockId, BasicBlock>,
    source_index: &'a SourceMapIndex,
}

impl FuncBuilder<'_> {
    fn new_block(&mut self) -> BasicBlockId {
        let id = BasicBlockId(NodeId(self.id_group.alloc()));
        self.blocks.insert(id, BasicBlock::new(id, self.function_id));
        id
    }

    fn push(&mut self, block: BasicBlockId, kind: InstKind) -> ValueRef {
        self.push_at(block, kind, None)
    }

    /// Like [`Self::push`], but recovers a source map for the instruction from the
    /// Yul expression's byte offset when one is available (every instruction lowered
    /// straight from a Yul function call has one; synthetic control-flow/phi
    /// instructions the lifter inserts itself don't).
    fn push_at(&mut self, block: BasicBlockId, kind: InstKind, offset: Option<usize>) -> ValueRef {
        let id = NodeId(self.id_group.alloc());
        let source_map = offset.and_then(|o| self.source_index.lookup(o));
        self.blocks
            .get_mut(&block)
            .expect("block exists")
            .instructions
            .push(Instruction { id, source_map, kind });
        ValueRef::Instruction(id)
    }

    /// Appends a result-less instruction (a terminator, or a call whose value is
    /// never used), without the caller needing a `ValueRef` back.
    fn set_terminator(&mut self, block: BasicBlockId, kind: InstKind) {
        self.push(block, kind);
    }

    fn link(&mut self, from: BasicBlockId, to: BasicBlockId) {
        self.blocks.get_mut(&from).expect("block exists").successors.push(to);
        self.blocks.get_mut(&to).expect("block exists").predecessors.push(from);
    }

    fn constant(&mut self, contract: &mut Contract, kind: ConstantKind) -> ValueRef {
        ValueRef::Constant(contract.intern_constant(kind))
    }

    fn lower_literal(&mut self, contract: &mut Contract, literal: &yul::Literal) -> ValueRef {
        let kind = match literal {
            yul::Literal::Decimal(s) => ConstantKind::Int(U256::from_dec_str(s).unwrap_or_default()),
            yul::Literal::Hex(s) => {
                ConstantKind::Int(U256::from_str_radix(s.trim_start_matches("0x"), 16).unwrap_or_default())
            }
            yul::Literal::Str(s) => ConstantKind::Str(s.clone()),
            yul::Literal::HexStr(s) => ConstantKind::HexStr(s.clone()),
        };
        self.constant(contract, kind)
    }

    fn lower_expr(&mut self, contract: &mut Contract, block: BasicBlockId, env: &Env, expr: &yul::Expression) -> ValueRef {
        match expr {
            yul::Expression::Identifier(name) => env.get(name),
            yul::Expression::Literal(lit) => self.lower_literal(contract, lit),
            yul::Expression::FunctionCall { name, args, offset } => {
                let args: Vec<ValueRef> = args.iter().map(|a| self.lower_expr(contract, block, env, a)).collect();
                if let Some(op) = hookaudit_interface::EvmOp::from_mnemonic(name) {
                    return self.push_at(block, InstKind::Evm { op, args }, Some(*offset));
                }
                if let Some(&callee) = self.table.get(name) {
                    return self.push_at(block, InstKind::Call(CallInst { callee, args }), Some(*offset));
                }
                self.push_at(
                    block,
                    InstKind::YulFunc(YulFuncInst {
                        name: name.clone(),
                        args,
                        return_index: None,
                        return_count: 1,
                    }),
                    Some(*offset),
                )
            }
        }
    }

    /// Lowers a call statement that may bind more than one name, unpacking a
    /// multi-return call through one `ExtractReturnValue`/`YulFunc` per result.
    fn lower_call_bindings(
        &mut self,
        contract: &mut Contract,
        block: BasicBlockId,
        env: &Env,
        names: &[String],
        value: &yul::Expression,
    ) -> Vec<ValueRef> {
        if names.len() <= 1 {
            return vec![self.lower_expr(contract, block, env, value)];
        }
        let yul::Expression::FunctionCall { name, args, offset } = value else {
            return names.iter().map(|_| self.lower_expr(contract, block, env, value)).collect();
        };
        let args: Vec<ValueRef> = args.iter().map(|a| self.lower_expr(contract, block, env, a)).collect();
        if let Some(&callee) = self.table.get(name) {
            let call = self.push_at(block, InstKind::Call(CallInst { callee, args }), Some(*offset));
            return (0..names.len())
                .map(|i| {
                    self.push_at(
                        block,
                        InstKind::ExtractReturnValue(crate::instruction::ExtractReturnValueInst {
                            call: call.id(),
                            return_index: i,
                        }),
                        Some(*offset),
                    )
                })
                .collect();
        }
        (0..names.len())
            .map(|i| {
                self.push_at(
                    block,
                    InstKind::YulFunc(YulFuncInst {
                        name: name.clone(),
                        args: args.clone(),
                        return_index: Some(i),
                        return_count: names.len(),
                    }),
                    Some(*offset),
                )
            })
            .collect()
    }

    fn lower_block(&mut self, contract: &mut Contract, body: &yul::Block, entry: BasicBlockId, env: Env) -> Result<FlowEnd> {
        let mut current = entry;
        let mut env = env;
        for stmt in &body.statements {
            match stmt {
                yul::Statement::FunctionDefinition(_) => {}
                yul::Statement::Block(inner) => {
                    let end = self.lower_block(contract, inner, current, env)?;
                    if end.terminated {
                        return Ok(end);
                    }
                    current = end.block;
                    env = end.env;
                }
                yul::Statement::VariableDeclaration { names, value } => {
                    let values = match value {
                        Some(v) => self.lower_call_bindings(
                            contract,
                            current,
                            &env,
                            &names.iter().map(|n| n.name.clone()).collect::<Vec<_>>(),
                            v,
                        ),
                        None => names
                            .iter()
                            .map(|_| self.constant(contract, ConstantKind::Int(U256::zero())))
                            .collect(),
                    };
                    for (name, value) in names.iter().zip(values) {
                        env.bind(&name.name, value);
                    }
                }
                yul::Statement::Assignment { names, value } => {
                    let values = self.lower_call_bindings(contract, current, &env, names, value);
                    for (name, value) in names.iter().zip(values) {
                        env.bind(name, value);
                    }
                }
                yul::Statement::ExpressionStatement(expr) => {
                    self.lower_expr(contract, current, &env, expr);
                }
                yul::Statement::If { condition, body } => {
                    let cond = self.lower_expr(contract, current, &env, condition);
                    let then_block = self.new_block();
                    let join_block = self.new_block();
                    self.set_terminator(
                        current,
                        InstKind::Branch(BranchInst {
                            condition: Some(cond),
                            true_target: then_block,
                            false_target: Some(join_block),
                        }),
                    );
                    self.link(current, then_block);
                    self.link(current, join_block);

                    let then_end = self.lower_block(contract, body, then_block, env.clone())?;
                    if !then_end.terminated {
                        self.set_terminator(
                            then_end.block,
                            InstKind::Branch(BranchInst {
                                condition: None,
                                true_target: join_block,
                                false_target: None,
                            }),
                        );
                        self.link(then_end.block, join_block);
                        env = merge_envs(self, join_block, &[(current, env.clone()), (then_end.block, then_end.env)]);
                    }
                    current = join_block;
                }
                yul::Statement::Switch { scrutinee, cases } => {
                    let scrutinee_val = self.lower_expr(contract, current, &env, scrutinee);
                    let join_block = self.new_block();
                    let mut switch_cases = Vec::new();
                    let mut default_block = None;
                    let mut incoming = Vec::new();
                    for case in cases {
                        let case_block = self.new_block();
                        self.link(current, case_block);
                        match &case.value {
                            Some(lit) => {
                                let case_const = self.lower_literal(contract, lit);
                                let num = match &case_const {
                                    ValueRef::Constant(id) => contract.constant(*id).and_then(crate::constant::Constant::as_u256),
                                    _ => None,
                                }
                                .unwrap_or_default();
                                switch_cases.push((num, case_block));
                            }
                            None => default_block = Some(case_block),
                        }
                        let case_end = self.lower_block(contract, &case.body, case_block, env.clone())?;
                        if !case_end.terminated {
                            self.set_terminator(
                                case_end.block,
                                InstKind::Branch(BranchInst {
                                    condition: None,
                                    true_target: join_block,
                                    false_target: None,
                                }),
                            );
                            self.link(case_end.block, join_block);
                            incoming.push((case_end.block, case_end.env));
                        }
                    }
                    let default_block = default_block.unwrap_or_else(|| {
                        let block = self.new_block();
                        self.link(current, block);
                        self.set_terminator(
                            block,
                            InstKind::Branch(BranchInst {
                                condition: None,
                                true_target: join_block,
                                false_target: None,
                            }),
                        );
                        self.link(block, join_block);
                        incoming.push((block, env.clone()));
                        block
                    });
                    self.set_terminator(
                        current,
                        InstKind::Switch(SwitchInst {
                            scrutinee: scrutinee_val,
                            cases: switch_cases,
                            default: default_block,
                        }),
                    );
                    env = merge_envs(self, join_block, &incoming);
                    current = join_block;
                }
                yul::Statement::ForLoop { init, condition, post, body } => {
                    let init_end = self.lower_block(contract, init, current, env)?;
                    current = init_end.block;
                    env = init_end.env;

                    let loop_entry = self.new_block();
                    self.set_terminator(
                        current,
                        InstKind::Branch(BranchInst {
                            condition: None,
                            true_target: loop_entry,
                            false_target: None,
                        }),
                    );
                    self.link(current, loop_entry);
                    self.blocks.get_mut(&loop_entry).expect("block exists").is_loop_entry = true;

                    let mut entry_env = Env::default();
                    let mut phi_ids: Vec<(String, NodeId)> = Vec::new();
                    for (name, value) in &env.vars {
                        let id = NodeId(self.id_group.alloc());
                        self.blocks.get_mut(&loop_entry).expect("block exists").instructions.push(Instruction {
                            id,
                            source_map: None,
                            kind: InstKind::Phi(PhiInst {
                                incoming: vec![PhiIncoming { from_block: current, value: *value }],
                            }),
                        });
                        entry_env.bind(name, ValueRef::Instruction(id));
                        phi_ids.push((name.clone(), id));
                    }

                    let compare_block = self.new_block();
                    self.blocks.get_mut(&loop_entry).expect("block exists").loop_compare = Some(compare_block);
                    self.blocks.get_mut(&compare_block).expect("block exists").current_loop_entry = Some(loop_entry);
                    self.link(loop_entry, compare_block);
                    self.set_terminator(
                        loop_entry,
                        InstKind::Branch(BranchInst {
                            condition: None,
                            true_target: compare_block,
                            false_target: None,
                        }),
                    );
                    let cond = self.lower_expr(contract, compare_block, &entry_env, condition);
                    let body_block = self.new_block();
                    self.blocks.get_mut(&body_block).expect("block exists").current_loop_entry = Some(loop_entry);
                    let join_block = self.new_block();
                    self.set_terminator(
                        compare_block,
                        InstKind::Branch(BranchInst {
                            condition: Some(cond),
                            true_target: body_block,
                            false_target: Some(join_block),
                        }),
                    );
                    self.link(compare_block, body_block);
                    self.link(compare_block, join_block);

                    let body_end = self.lower_block(contract, body, body_block, entry_env.clone())?;
                    if !body_end.terminated {
                        let post_block = self.new_block();
                        self.blocks.get_mut(&post_block).expect("block exists").current_loop_entry = Some(loop_entry);
                        self.set_terminator(
                            body_end.block,
                            InstKind::Branch(BranchInst {
                                condition: None,
                                true_target: post_block,
                                false_target: None,
                            }),
                        );
                        self.link(body_end.block, post_block);
                        let post_end = self.lower_block(contract, post, post_block, body_end.env)?;
                        if !post_end.terminated {
                            self.set_terminator(
                                post_end.block,
                                InstKind::Branch(BranchInst {
                                    condition: None,
                                    true_target: loop_entry,
                                    false_target: None,
                                }),
                            );
                            self.link(post_end.block, loop_entry);
                            for (name, phi_id) in &phi_ids {
                                if let Some(Instruction {
                                    kind: InstKind::Phi(phi), ..
                                }) = self.blocks.get_mut(&loop_entry).and_then(|bb| {
                                    bb.instructions.iter_mut().find(|i| i.id == *phi_id)
                                }) {
                                    phi.incoming.push(PhiIncoming {
                                        from_block: post_end.block,
                                        value: post_end.env.get(name),
                                    });
                                }
                            }
                        }
                    }

                    current = join_block;
                    env = entry_env;
                }
                yul::Statement::Break | yul::Statement::Continue => {
                    return Ok(FlowEnd { block: current, env, terminated: true });
                }
                yul::Statement::Leave => {
                    return Ok(FlowEnd { block: current, env, terminated: true });
                }
            }
        }
        Ok(FlowEnd { block: current, env, terminated: false })
    }
}

/// Inserts a phi at `join` for every name whose incoming blocks disagree on its value,
/// and records the unconditional phi otherwise (all predecessors agree, no node needed).
fn merge_envs(builder: &mut FuncBuilder<'_>, join: BasicBlockId, incoming: &[(BasicBlockId, Env)]) -> Env {
    let mut merged = Env::default();
    if incoming.is_empty() {
        return merged;
    }
    let mut names: Vec<&String> = incoming[0].1.vars.keys().collect();
    names.sort();
    for name in names {
        let mut values: Vec<(BasicBlockId, ValueRef)> = Vec::new();
        for (block, env) in incoming {
            if let Some(v) = env.vars.get(name) {
                values.push((*block, *v));
            }
        }
        let all_same = values.windows(2).all(|w| w[0].1 == w[1].1);
        if all_same {
            if let Some((_, v)) = values.first() {
                merged.bind(name, *v);
            }
        } else {
            let id = NodeId(builder.id_group.alloc());
            builder.blocks.get_mut(&join).expect("block exists").instructions.push(Instruction {
                id,
                source_map: None,
                kind: InstKind::Phi(PhiInst {
                    incoming: values.into_iter().map(|(from_block, value)| PhiIncoming { from_block, value }).collect(),
                }),
            });
            merged.bind(name, ValueRef::Instruction(id));
        }
    }
    merged
}
