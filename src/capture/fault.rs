//! Building fault records from errors and panics

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;

use serde::Serialize;

use crate::types::{FaultRecord, MAX_FAULT_DEPTH};

/// Fault type recorded for panics
pub const PANIC_FAULT_TYPE: &str = "panic";

/// A handler-reported fault.
///
/// Handlers that turn an error into a response can insert this into the
/// response extensions; the capture layer records it and leaves the
/// response untouched.
#[derive(Debug, Clone)]
pub struct ReportedFault(FaultRecord);

impl ReportedFault {
    pub fn new(fault_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self(FaultRecord::new(fault_type, message))
    }

    /// Record `error` and its `source()` chain, outermost first
    pub fn from_error<E: Error + 'static>(error: &E) -> Self {
        let mut fault = chain_from_error(short_type_name::<E>(), error);
        fault.source = Some(module_path_of::<E>().to_string());
        fault.stack_trace = capture_backtrace();
        Self(fault)
    }

    pub fn with_data<T: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &T) -> Self {
        self.0.insert_data(key, value);
        self
    }

    pub fn into_record(self) -> FaultRecord {
        self.0
    }
}

/// Walk `error.source()` iteratively, keeping at most
/// [`MAX_FAULT_DEPTH`] links.
pub fn chain_from_error(fault_type: &str, error: &(dyn Error + 'static)) -> FaultRecord {
    let mut links = vec![FaultRecord::new(fault_type, error.to_string())];
    let mut source = error.source();
    while let Some(err) = source {
        if links.len() >= MAX_FAULT_DEPTH {
            break;
        }
        links.push(FaultRecord::new("source", err.to_string()));
        source = err.source();
    }
    FaultRecord::chain(links).unwrap_or_default()
}

/// Fault for a caught panic payload.
///
/// Call from the frame that caught the panic: the backtrace is taken there
/// and the source is the current thread's name.
pub fn from_panic(payload: &(dyn Any + Send)) -> FaultRecord {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    };
    let mut fault = FaultRecord::new(PANIC_FAULT_TYPE, message);
    fault.source = std::thread::current().name().map(String::from);
    fault.stack_trace = Some(Backtrace::force_capture().to_string());
    fault
}

/// Keep the first `max_lines` lines of a stack trace
pub fn truncate_stack(trace: &str, max_lines: usize) -> String {
    let total = trace.lines().count();
    if total <= max_lines {
        return trace.to_string();
    }
    let mut out: Vec<&str> = trace.lines().take(max_lines).collect();
    let omitted = format!("   ... {} more", total - max_lines);
    out.push(&omitted);
    out.join("\n")
}

fn capture_backtrace() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// `a::b::Type<..>` -> `a::b`
fn module_path_of<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit_once("::").map_or(base, |(module, _)| module)
}
