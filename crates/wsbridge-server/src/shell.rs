use std::io::{BufRead, Write};
use wsbridge_common::config::BridgeConfig;
use wsbridge_common::protocol::{BridgeError, Result, SlotRef, WorkerId};

use crate::runtime::interpreter::Interpreter;
use crate::runtime::slot_pool::SlotPool;

pub const PROMPT: &str = "wsbridge> ";

/// Typing this on its own line leaves the shell and lets the worker serve.
pub const CONTINUE: &str = "cont";

/// Whether `worker` is taken over by the debug shell.
pub fn should_hijack(config: &BridgeConfig, worker: WorkerId) -> bool {
    config.shell && worker == 1
}

/// Read-eval-print loop over one interpreter.
///
/// Each line is evaluated and its completion value (or the thrown error) is
/// printed. The loop ends on `cont` or end of input.
pub fn run_shell(interp: &mut Interpreter, input: impl BufRead, mut output: impl Write) -> Result<()> {
    write!(output, "{}", PROMPT)?;
    output.flush()?;
    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line == CONTINUE {
            break;
        }
        if !line.is_empty() {
            match interp.eval(line) {
                Ok(value) => writeln!(output, "{}", interp.display(&value))?,
                Err(e) => writeln!(output, "{}", e)?,
            }
        }
        write!(output, "{}", PROMPT)?;
        output.flush()?;
    }
    writeln!(output)?;
    Ok(())
}

/// Runs the shell against the first instance of `worker` when the shell
/// flag is on. Returns whether the worker was hijacked.
pub fn hijack_worker(
    pool: &SlotPool,
    worker: WorkerId,
    input: impl BufRead,
    output: impl Write,
) -> Result<bool> {
    if !should_hijack(pool.config(), worker) {
        return Ok(false);
    }
    let slot = SlotRef::new(worker, 0);
    let instance = pool.instance(slot).ok_or(BridgeError::UnknownSlot(slot))?;
    let mut interp = instance
        .try_borrow_mut()
        .map_err(|_| BridgeError::SlotBusy(slot))?;
    tracing::info!("worker {} hijacked by the debug shell", worker);
    run_shell(&mut interp, input, output)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use wsbridge_common::config::WorkerLayout;
    use wsbridge_common::host::MemoryHost;

    fn interpreter() -> Interpreter {
        Interpreter::new(SlotRef::new(1, 0), 0, Rc::new(MemoryHost::new())).unwrap()
    }

    fn run(input: &str) -> String {
        let mut interp = interpreter();
        let mut out = Vec::new();
        run_shell(&mut interp, input.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_eval_lines() {
        let out = run("var x = 40;\nx + 2\n");
        assert!(out.starts_with(PROMPT));
        assert!(out.contains("42"));
    }

    #[test]
    fn test_errors_are_printed() {
        let out = run("throw new Error('nope')\n");
        assert!(out.contains("nope"));
    }

    #[test]
    fn test_cont_stops_reading() {
        let out = run("1 + 1\ncont\n'after'\n");
        assert!(out.contains('2'));
        assert!(!out.contains("after"));
    }

    #[test]
    fn test_bindings_are_reachable() {
        let out = run("wsbridge.mywid\n");
        assert!(out.contains('1'));
    }

    #[test]
    fn test_hijack_only_worker_one() {
        let mut config = BridgeConfig::new();
        config.shell = true;
        let layout = WorkerLayout { workers: 2, ..WorkerLayout::default() };
        let mut pool = SlotPool::new(config, layout, Rc::new(MemoryHost::new())).unwrap();
        pool.initialize_all().unwrap();

        let mut out = Vec::new();
        assert!(!hijack_worker(&pool, 2, "".as_bytes(), &mut out).unwrap());
        assert!(out.is_empty());
        assert!(hijack_worker(&pool, 1, "wsbridge.mysid\n".as_bytes(), &mut out).unwrap());
        assert!(String::from_utf8(out).unwrap().contains('0'));
    }

    #[test]
    fn test_shell_flag_off() {
        assert!(!should_hijack(&BridgeConfig::new(), 1));
    }
}
