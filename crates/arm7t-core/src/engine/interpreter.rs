use super::{boundary_stop, EngineHost, RunOutcome, StopReason};
use crate::semantics::InstructionSet;

/// Decodes and executes one instruction at a time. Holds no state, so it is
/// always safe to use on self-modifying code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interpreter;

impl Interpreter {
    /// Executes from the host's PC until a stop condition.
    pub fn run<I, H>(&mut self, isa: &I, host: &mut H, limit: u32) -> RunOutcome
    where
        I: InstructionSet,
        H: EngineHost + ?Sized,
    {
        let mut retired = 0;
        loop {
            if retired >= limit {
                return RunOutcome::new(retired, StopReason::Limit);
            }
            let pc = host.pc();
            let completion = match isa
                .decode(host, pc)
                .and_then(|insn| isa.execute(host, pc, &insn))
            {
                Ok(completion) => completion,
                Err(fault) => {
                    host.memory_trap(fault);
                    return RunOutcome::new(retired, StopReason::EitPending);
                }
            };
            host.set_pc(completion.npc());
            host.retire(pc, I::MODE);
            retired += 1;

            if let Some(stop) = boundary_stop(host, completion, retired, limit) {
                return RunOutcome::new(retired, stop);
            }
        }
    }
}
