//! djs - heap inspection shell
//!
//! Drives a runtime one command at a time. Values are bound to names; each
//! name holds one reference until it is released.

use std::collections::HashMap;

use dynjs::runtime::iterator::{ENUMERATE, HIDDEN, OWNONLY};
use dynjs::{DynValue, GcPolicyKind, GcRef, JsResult, PropKey, Runtime, RuntimeConfig, RuntimeError};
use regex::Regex;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
commands:
  obj NAME [PROTO]        new object, optionally inheriting from PROTO (or null)
  arr NAME [VALUE...]     new regular array
  str NAME TEXT           new string
  set NAME KEY VALUE      NAME[KEY] = VALUE
  get NAME KEY            print NAME[KEY]
  del NAME KEY            delete NAME[KEY]
  proto NAME [PROTO]      print or replace the prototype
  keys NAME [own|hidden]  for-in keys
  release NAME            drop the reference held by NAME
  gc                      collect cycles
  stats                   memory usage
  policy [NAME]           print or switch the cycle collector (resets the heap)
  vars                    list bound names
  help | quit
values: numbers, true, false, null, undefined, \"text\", or a bound NAME";

struct Shell {
    rt: Runtime,
    config: RuntimeConfig,
    vars: HashMap<String, DynValue>,
    command: Regex,
    token: Regex,
}

/// An operand; `owned` values are released after use
struct Operand {
    value: DynValue,
    owned: bool,
}

impl Shell {
    fn new(config: RuntimeConfig) -> JsResult<Self> {
        Ok(Shell {
            rt: Runtime::new(config.clone())?,
            config,
            vars: HashMap::new(),
            command: Regex::new(r"^\s*([a-z]+)\s*(.*?)\s*$").map_err(shell_error)?,
            token: Regex::new(r#""((?:[^"\\]|\\.)*)"|(\S+)"#).map_err(shell_error)?,
        })
    }

    fn tokens(&self, rest: &str) -> Vec<String> {
        self.token
            .captures_iter(rest)
            .map(|c| match (c.get(1), c.get(2)) {
                (Some(quoted), _) => format!("\"{}\"", quoted.as_str().replace("\\\"", "\"")),
                (None, Some(word)) => word.as_str().to_string(),
                (None, None) => String::new(),
            })
            .collect()
    }

    /// Run one line; returns false on `quit`
    fn execute(&mut self, line: &str) -> bool {
        let Some(caps) = self.command.captures(line) else {
            return true;
        };
        let cmd = caps.get(1).map_or("", |m| m.as_str()).to_string();
        let args = self.tokens(caps.get(2).map_or("", |m| m.as_str()));
        if cmd == "quit" || cmd == "exit" {
            return false;
        }
        match self.dispatch(&cmd, &args) {
            Ok(Some(out)) => println!("{}", out),
            Ok(None) => {}
            Err(err) => println!("error: {}", err),
        }
        true
    }

    fn dispatch(&mut self, cmd: &str, args: &[String]) -> JsResult<Option<String>> {
        let arg = |i: usize| -> JsResult<&str> {
            args.get(i)
                .map(String::as_str)
                .ok_or_else(|| RuntimeError::syntax_error(format!("'{}' needs more arguments; try 'help'", cmd)))
        };
        match cmd {
            "help" => Ok(Some(HELP.to_string())),
            "obj" => {
                let name = arg(0)?;
                let obj = match args.get(1) {
                    None => self.rt.new_object()?,
                    Some(p) if p == "null" => self.rt.new_object_with_proto(None)?,
                    Some(p) => {
                        let proto = self.object(p)?;
                        self.rt.new_object_with_proto(Some(proto))?
                    }
                };
                self.bind(name, DynValue::Object(obj));
                Ok(None)
            }
            "arr" => {
                let name = arg(0)?;
                let mut operands = Vec::new();
                for text in &args[1.min(args.len())..] {
                    match self.operand(text) {
                        Ok(op) => operands.push(op),
                        Err(err) => {
                            self.drop_operands(operands);
                            return Err(err);
                        }
                    }
                }
                let values: Vec<DynValue> = operands.iter().map(|op| op.value).collect();
                let arr = self.rt.new_array_from(&values);
                self.drop_operands(operands);
                self.bind(name, DynValue::Object(arr?));
                Ok(None)
            }
            "str" => {
                let name = arg(0)?;
                let text = args.get(1..).unwrap_or(&[]).join(" ");
                let s = self.rt.new_string(text.trim_matches('"'))?;
                self.bind(name, s);
                Ok(None)
            }
            "set" => {
                let obj = self.object(arg(0)?)?;
                let key = self.key(arg(1)?)?;
                let value = self.operand(arg(2)?)?;
                let result = self.rt.put(obj, key, value.value, true);
                self.drop_operands(vec![value]);
                result.map(|_| None)
            }
            "get" => {
                let obj = self.object(arg(0)?)?;
                let key = self.key(arg(1)?)?;
                let v = self.rt.get(obj, key)?;
                let out = self.show(v);
                self.rt.release_value(v);
                Ok(Some(out))
            }
            "del" => {
                let obj = self.object(arg(0)?)?;
                let key = self.key(arg(1)?)?;
                let deleted = self.rt.delete(obj, key, true)?;
                Ok(Some(deleted.to_string()))
            }
            "proto" => {
                let obj = self.object(arg(0)?)?;
                match args.get(1) {
                    None => {
                        let proto = self.rt.get_prototype_of(obj)?;
                        Ok(Some(proto.map_or("null".to_string(), |p| self.show(DynValue::Object(p)))))
                    }
                    Some(p) if p == "null" => self.rt.set_prototype_of(obj, None).map(|_| None),
                    Some(p) => {
                        let proto = self.object(p)?;
                        self.rt.set_prototype_of(obj, Some(proto)).map(|_| None)
                    }
                }
            }
            "keys" => {
                let target = self.lookup(arg(0)?)?;
                let flags = match args.get(1).map(String::as_str) {
                    Some("own") => ENUMERATE | OWNONLY,
                    Some("hidden") => ENUMERATE | HIDDEN,
                    _ => ENUMERATE,
                };
                let it = self.rt.make_iterator(target, flags)?;
                let keys = self.rt.collect_keys(it);
                self.rt.release(it);
                Ok(Some(format!("[{}]", keys.join(", "))))
            }
            "release" => {
                let name = arg(0)?;
                let v = self
                    .vars
                    .remove(name)
                    .ok_or_else(|| RuntimeError::reference_error(format!("{} is not defined", name)))?;
                self.rt.release_value(v);
                Ok(None)
            }
            "gc" => {
                let stats = self.rt.collect_cycles();
                Ok(Some(format!(
                    "freed {} cells ({} bytes), {} -> {} live, {} scanned",
                    stats.freed, stats.bytes_freed, stats.cells_before, stats.cells_after, stats.roots_scanned
                )))
            }
            "stats" => Ok(Some(self.rt.usage_summary())),
            "policy" => match args.first() {
                None => Ok(Some(self.config.gc_policy.name().to_string())),
                Some(name) => {
                    let kind = GcPolicyKind::parse(name)
                        .ok_or_else(|| RuntimeError::Config(format!("unknown policy '{}'", name)))?;
                    self.reset(self.config.clone().with_policy(kind))?;
                    Ok(Some(format!("switched to {}", kind.name())))
                }
            },
            "vars" => {
                let mut names: Vec<&String> = self.vars.keys().collect();
                names.sort();
                let lines: Vec<String> = names
                    .into_iter()
                    .map(|n| format!("{} = {}", n, self.show(self.vars[n])))
                    .collect();
                Ok(Some(lines.join("\n")))
            }
            other => Err(RuntimeError::syntax_error(format!("unknown command '{}'", other))),
        }
    }

    fn lookup(&self, name: &str) -> JsResult<DynValue> {
        self.vars
            .get(name)
            .copied()
            .ok_or_else(|| RuntimeError::reference_error(format!("{} is not defined", name)))
    }

    fn object(&self, name: &str) -> JsResult<GcRef> {
        match self.lookup(name)? {
            DynValue::Object(r) => Ok(r),
            _ => Err(RuntimeError::type_error(format!("{} is not an object", name))),
        }
    }

    fn key(&mut self, text: &str) -> JsResult<PropKey> {
        self.rt.key(text.trim_matches('"'))
    }

    fn operand(&mut self, text: &str) -> JsResult<Operand> {
        let borrowed = |value| Operand { value, owned: false };
        if let Some(inner) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            return Ok(Operand {
                value: self.rt.new_string(inner)?,
                owned: true,
            });
        }
        Ok(borrowed(match text {
            "true" => DynValue::Boolean(true),
            "false" => DynValue::Boolean(false),
            "null" => DynValue::Null,
            "undefined" => DynValue::Undefined,
            "NaN" => DynValue::NaN,
            _ => match text.parse::<f64>() {
                Ok(d) => DynValue::from_f64(d),
                Err(_) => self.lookup(text)?,
            },
        }))
    }

    fn drop_operands(&mut self, operands: Vec<Operand>) {
        for op in operands.into_iter().filter(|op| op.owned) {
            self.rt.release_value(op.value);
        }
    }

    /// Bind a name to an owned value, releasing what it held before
    fn bind(&mut self, name: &str, value: DynValue) {
        if let Some(old) = self.vars.insert(name.to_string(), value) {
            self.rt.release_value(old);
        }
    }

    fn show(&self, v: DynValue) -> String {
        match v {
            DynValue::Object(r) => format!(
                "{} {} (rc {})",
                self.rt.class_of(r).name(),
                r,
                self.rt.refcount(r)
            ),
            DynValue::String(_) => format!("\"{}\"", self.rt.display_value(v)),
            _ => self.rt.display_value(v),
        }
    }

    /// Drop every binding and start over with a fresh runtime
    fn reset(&mut self, config: RuntimeConfig) -> JsResult<()> {
        let fresh = Runtime::new(config.clone())?;
        for (_, v) in self.vars.drain() {
            self.rt.release_value(v);
        }
        let old = std::mem::replace(&mut self.rt, fresh);
        if let Err(err) = old.leak_check() {
            tracing::warn!(%err, "previous runtime leaked");
        }
        self.config = config;
        Ok(())
    }
}

fn shell_error(err: regex::Error) -> RuntimeError {
    RuntimeError::Config(err.to_string())
}

fn parse_args() -> Result<(RuntimeConfig, Option<String>), String> {
    let mut config = RuntimeConfig::default();
    let mut script = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--policy" => {
                let name = args.next().ok_or("--policy needs a name")?;
                let kind = GcPolicyKind::parse(&name).ok_or_else(|| format!("unknown policy '{}'", name))?;
                config = config.with_policy(kind);
            }
            "--heap" => {
                let size = args.next().ok_or("--heap needs a size in bytes")?;
                let size = size.parse().map_err(|_| format!("invalid heap size '{}'", size))?;
                config = config.with_app_heap_size(size);
            }
            "--embedded" => {
                config = RuntimeConfig::embedded().with_policy(config.gc_policy);
            }
            _ if script.is_none() => script = Some(arg),
            _ => return Err(format!("unexpected argument '{}'", arg)),
        }
    }
    Ok((config, script))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let (config, script) = match parse_args() {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("djs: {}", msg);
            std::process::exit(2);
        }
    };
    let mut shell = match Shell::new(config) {
        Ok(shell) => shell,
        Err(err) => {
            eprintln!("djs: {}", err);
            std::process::exit(2);
        }
    };

    match script {
        Some(path) => run_file(&mut shell, &path),
        None => run_repl(&mut shell),
    }
}

fn run_file(shell: &mut Shell, path: &str) {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", path, e);
            std::process::exit(1);
        }
    };
    for line in source.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !shell.execute(line) {
            break;
        }
    }
}

fn run_repl(shell: &mut Shell) {
    println!("djs - dynjs heap shell ({})", shell.config.gc_policy.name());
    println!("Type 'help' for commands, Ctrl+D to exit.\n");

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Error starting line editor: {}", e);
            std::process::exit(1);
        }
    };
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if !shell.execute(line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        }
    }
}
