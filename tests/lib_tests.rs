use marcel::env::{EnvDelta, Environment};
use marcel::error::{Error, EvalError, NamespaceError, OpError};
use marcel::function::{Arg, Callable, Compiler, Function};
use marcel::namespace::{Bindings, Namespace};
use marcel::utils::config::Config;
use marcel::utils::marcel_toml::parse_marcel_toml;
use marcel::utils::{apply_file_to_config, load_marcel_toml};
use marcel::{Label, Record, Value};
use std::sync::Arc;
use std::time::Duration;

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|&n| Value::Int(n)).collect()
}

// --- Record normalization ---

#[test]
fn test_record_wraps_scalar() {
    let r = Record::wrap(Value::Int(7));
    assert_eq!(r.arity(), 1);
    assert_eq!(r.values(), &[Value::Int(7)]);
}

#[test]
fn test_record_wraps_list_as_fields() {
    let r = Record::wrap(Value::List(ints(&[1, 2, 3])));
    assert_eq!(r.arity(), 3);
    assert_eq!(r.get(2), Some(&Value::Int(3)));
}

#[test]
fn test_record_empty_list_stays_one_field() {
    let r = Record::wrap(Value::List(Vec::new()));
    assert_eq!(r.arity(), 1);
    assert_eq!(r.values(), &[Value::List(Vec::new())]);
}

#[test]
fn test_record_from_no_values_is_never_empty() {
    let r = Record::from_values(Vec::new());
    assert_eq!(r.arity(), 1);
}

#[test]
fn test_record_prepend_label() {
    let r = Record::from(5).prepend(Label::Thread(2).to_value());
    assert_eq!(r.values(), &ints(&[2, 5])[..]);
}

#[test]
fn test_record_into_value() {
    assert_eq!(Record::from(3).into_value(), Value::Int(3));
    assert_eq!(
        Record::from_values(ints(&[1, 2])).into_value(),
        Value::List(ints(&[1, 2]))
    );
}

#[test]
fn test_record_display() {
    assert_eq!(Record::from(3).to_string(), "3");
    assert_eq!(
        Record::from_values(vec![Value::Int(1), Value::from("a")]).to_string(),
        "(1, \"a\")"
    );
}

// --- Error values ---

#[test]
fn test_error_display_with_label_and_input() {
    let e = Error::new("division by zero")
        .with_input("0")
        .tagged(&Label::Thread(1));
    assert_eq!(e.to_string(), "Error(1: 0: division by zero)");
}

#[test]
fn test_error_keeps_inner_label() {
    let e = Error::new("x")
        .tagged(&Label::Host("inner".to_string()))
        .tagged(&Label::Thread(0));
    assert_eq!(e.label, Some(Label::Host("inner".to_string())));
}

#[test]
fn test_eval_error_maps_to_op_error() {
    assert!(matches!(
        OpError::from(EvalError::raised("bad")),
        OpError::Resumable(_)
    ));
    assert!(OpError::from(EvalError::KillCommand("stop".to_string())).is_fatal());
}

// --- Namespace ---

fn sample_namespace() -> Namespace {
    let mut globals = Bindings::new();
    globals.insert("a".to_string(), Value::Int(1));
    globals.insert("b".to_string(), Value::Int(2));
    Namespace::with_globals(globals)
}

#[test]
fn test_namespace_balanced_scopes_leave_flatten_unchanged() {
    let mut ns = sample_namespace();
    let before = ns.flatten();
    let mut frame = Bindings::new();
    frame.insert("a".to_string(), Value::Int(10));
    frame.insert("n".to_string(), Value::Int(4));
    ns.push_scope(frame);
    ns.push_scope(Bindings::new());
    ns.pop_scope().unwrap();
    ns.pop_scope().unwrap();
    assert_eq!(ns.flatten(), before);
    assert_eq!(ns.depth(), 1);
}

#[test]
fn test_namespace_inner_shadows_outer() {
    let mut ns = sample_namespace();
    let mut frame = Bindings::new();
    frame.insert("a".to_string(), Value::Int(10));
    ns.push_scope(frame);
    assert_eq!(ns.get("a"), Ok(&Value::Int(10)));
    assert_eq!(ns.flatten().get("a"), Some(&Value::Int(10)));
    assert_eq!(ns.get("b"), Ok(&Value::Int(2)));
}

#[test]
fn test_namespace_set_updates_defining_frame() {
    let mut ns = sample_namespace();
    ns.push_scope(Bindings::new());
    ns.set("b", Value::Int(20));
    ns.set("c", Value::Int(30));
    ns.pop_scope().unwrap();
    assert_eq!(ns.get("b"), Ok(&Value::Int(20)));
    assert_eq!(ns.get("c"), Err(NamespaceError::KeyError("c".to_string())));
}

#[test]
fn test_namespace_pop_global_fails() {
    let mut ns = Namespace::new();
    assert_eq!(ns.pop_scope(), Err(NamespaceError::ScopeUnderflow));
}

#[test]
fn test_namespace_delete() {
    let mut ns = sample_namespace();
    assert_eq!(ns.delete("a"), Ok(Value::Int(1)));
    assert!(!ns.contains("a"));
    assert!(ns.delete("a").is_err());
}

// --- Functions and arguments ---

struct ConstCompiler;

impl Compiler for ConstCompiler {
    fn compile(&self, source: &str) -> Result<Arc<dyn Callable>, EvalError> {
        if source == "bad" {
            return Err(EvalError::raised("syntax error"));
        }
        let callable = |_env: &Environment, _args: &[Value]| Ok::<Value, EvalError>(Value::Int(42));
        Ok(Arc::new(callable))
    }
}

#[test]
fn test_function_without_compiler_is_fatal() {
    let env = Environment::new(Config::default());
    let mut f = Function::source("x: x + 1");
    assert!(f.resolve(&env).unwrap_err().is_fatal());
}

#[test]
fn test_function_resolved_by_compiler() {
    let env = Environment::new(Config::default()).with_compiler(Arc::new(ConstCompiler));
    let mut f = Function::source("x: 42");
    f.resolve(&env).unwrap();
    assert!(f.is_resolved());
    assert_eq!(f.call(&env, &[]), Ok(Value::Int(42)));
    assert!(Function::source("bad").resolve(&env).is_err());
}

#[test]
fn test_arg_var_resolves_from_namespace() {
    let mut env = Environment::new(Config::default());
    env.setvar("n", Value::Int(4));
    assert_eq!(Arg::var("n").resolve_int(&env, "count").unwrap(), 4);
    assert!(Arg::var("missing").resolve(&env).unwrap_err().is_fatal());
    assert!(Arg::from("x").resolve_int(&env, "count").is_err());
}

// --- Environment snapshots and deltas ---

#[test]
fn test_env_delta_reports_changes_only() {
    let mut env = Environment::new(Config::default());
    env.setvar("keep", Value::Int(1));
    env.setvar("change", Value::Int(1));
    let before = env.snapshot();
    env.setvar("change", Value::Int(2));
    env.setvar("new", Value::from("x"));
    env.set_current_dir("/marcel-test-dir");
    let delta = env.delta_since(&before);
    assert_eq!(delta.vars.len(), 2);
    assert_eq!(delta.vars.get("change"), Some(&Value::Int(2)));
    assert_eq!(delta.current_dir, Some("/marcel-test-dir".into()));

    let mut parent = Environment::new(Config::default());
    parent.apply_delta(delta);
    assert_eq!(parent.getvar("new"), Ok(&Value::from("x")));
    assert_eq!(parent.current_dir(), std::path::Path::new("/marcel-test-dir"));
}

#[test]
fn test_env_delta_json() {
    let delta: EnvDelta = serde_json::from_str(r#"{"vars":{"x":[1,2]}}"#).unwrap();
    assert_eq!(delta.vars.get("x"), Some(&Value::List(ints(&[1, 2]))));
    assert!(delta.current_dir.is_none());
    assert!(EnvDelta::default().is_empty());
}

#[test]
fn test_env_snapshot_roundtrip_through_new_environment() {
    let mut env = Environment::new(Config::default());
    env.setvar("x", Value::Int(3));
    let copy = Environment::from_snapshot(env.snapshot(), Config::default());
    assert_eq!(copy.getvar("x"), Ok(&Value::Int(3)));
    assert_eq!(copy.current_dir(), env.current_dir());
}

#[test]
fn test_env_cancel_flag_shared_by_clones() {
    let env = Environment::new(Config::default());
    let clone = env.clone();
    env.cancel();
    assert!(matches!(clone.check_cancelled(), Err(OpError::Cancelled)));
    clone.reset_cancel();
    assert!(!env.is_cancelled());
}

// --- Config file ---

const SAMPLE_TOML: &str = r#"
[settings]
prompt = "> "
kill_timeout_ms = 50
remote_command = ["ssh", "{host}", "marcel", "run"]

[clusters.lab]
hosts = ["a", "b"]
user = "me"
"#;

#[test]
fn test_config_file_overrides_present_fields() {
    let file = parse_marcel_toml(SAMPLE_TOML).unwrap();
    let mut config = Config::default();
    apply_file_to_config(&file, &mut config);
    assert_eq!(config.prompt, "> ");
    assert_eq!(config.kill_timeout, Duration::from_millis(50));
    assert_eq!(config.fork_join_poll, Config::default().fork_join_poll);
    assert_eq!(config.remote_command[1], "{host}");
    let lab = config.cluster("lab").unwrap();
    assert_eq!(lab.hosts, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(lab.address("a"), "me@a");
}

#[test]
fn test_config_file_loaded_from_dir() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_marcel_toml(dir.path()).is_none());
    std::fs::write(dir.path().join(".marcel.toml"), SAMPLE_TOML).unwrap();
    assert!(load_marcel_toml(dir.path()).is_some());
    std::fs::write(dir.path().join(".marcel.toml"), "[settings\nbroken").unwrap();
    assert!(load_marcel_toml(dir.path()).is_none());
}

#[test]
fn test_config_rejects_wrong_types() {
    assert!(parse_marcel_toml("[settings]\nkill_timeout_ms = \"soon\"").is_err());
}
