use marcel::api::{
    collect, func, gather, r#gen, gen_from, load, ls, map, pipeline, run, runpipeline, select,
    store,
};
use marcel::engine::{JsonLines, ShellLine, parse_line, run_request};
use marcel::env::{EnvSnapshot, Environment};
use marcel::error::{EvalError, OpError, OpResult};
use marcel::function::{Arg, Function};
use marcel::ops::{Collect, Collected, Gen, Map};
use marcel::pipeline::{
    Command, Downstream, Node, Op, Pipeline, PipelineSpec, PipelineWrapper, RemoteMessage,
    RemoteRequest, logging_handler,
};
use marcel::utils::config::Config;
use marcel::{Item, Record, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

fn env() -> Environment {
    Environment::new(Config::default())
}

fn inc() -> Function {
    func("x: x + 1", |a| Ok(Value::Int(a[0].as_int().unwrap_or(0) + 1)))
}

fn ten_over() -> Function {
    func("x: 10 / x", |a| match a[0].as_int() {
        Some(0) => Err(EvalError::raised("division by zero")),
        Some(x) => Ok(Value::Int(10 / x)),
        None => Err(EvalError::raised("not a number")),
    })
}

fn values(items: &[Item]) -> Vec<Value> {
    items
        .iter()
        .filter_map(Item::record)
        .map(|r| r.clone().into_value())
        .collect()
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|&n| Value::Int(n)).collect()
}

/// Pass-through op counting its cleanups.
struct CleanupCounter(Arc<AtomicUsize>);

impl Op for CleanupCounter {
    fn name(&self) -> &'static str {
        "cleanup_counter"
    }

    fn receive(
        &mut self,
        env: &mut Environment,
        record: Record,
        out: &mut Downstream<'_>,
    ) -> OpResult<()> {
        out.send(env, record)
    }

    fn cleanup(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn copy(&self) -> Box<dyn Op> {
        Box::new(CleanupCounter(Arc::clone(&self.0)))
    }
}

// --- End to end ---

#[test]
fn test_gen_map_collect() {
    let mut env = env();
    let items = gather(&mut env, r#gen(5) | map(inc())).unwrap();
    assert_eq!(values(&items), ints(&[1, 2, 3, 4, 5]));
}

#[test]
fn test_error_does_not_abort_later_records() {
    let mut env = env();
    let items = gather(&mut env, r#gen(3) | map(ten_over())).unwrap();
    assert_eq!(items.len(), 3);
    match &items[0] {
        Item::Error(e) => {
            assert_eq!(e.input.as_deref(), Some("0"));
            assert!(e.message.contains("division by zero"));
        }
        other => panic!("expected an error, got {other}"),
    }
    assert_eq!(values(&items), ints(&[10, 5]));
}

#[test]
fn test_errors_pass_through_downstream_ops() {
    let mut env = env();
    let items = gather(&mut env, r#gen(3) | map(ten_over()) | map(inc())).unwrap();
    assert!(items[0].is_error());
    assert_eq!(values(&items), ints(&[11, 6]));
}

#[test]
fn test_parameterized_pipeline_invoked_twice() {
    let mut env = env();
    let p = PipelineWrapper::interactive(
        Pipeline::from_ops(vec![Box::new(Gen::new(Arg::var("n")))])
            .with_params(vec!["n".to_string()]),
    );
    env.setvar("p", Value::Pipeline(Arc::new(p)));
    let first = gather(&mut env, runpipeline("p", vec![Arg::from(4)])).unwrap();
    assert_eq!(values(&first), ints(&[0, 1, 2, 3]));
    let second = gather(&mut env, runpipeline("p", vec![Arg::from(2)])).unwrap();
    assert_eq!(values(&second), ints(&[0, 1]));
    assert_eq!(env.namespace().depth(), 1);
    assert!(!env.namespace().contains("n"));
}

#[test]
fn test_api_pipeline_builder() {
    let mut env = env();
    env.setvar(
        "evens",
        pipeline(&["n"], |_args| {
            let even = func("x: x % 2 == 0", |a| {
                Ok(Value::Bool(a[0].as_int().is_some_and(|x| x % 2 == 0)))
            });
            Ok((r#gen(Arg::var("n")) | select(even)).into_pipeline())
        }),
    );
    let items = gather(&mut env, runpipeline("evens", vec![Arg::from(6)])).unwrap();
    assert_eq!(values(&items), ints(&[0, 2, 4]));
}

#[test]
fn test_runpipeline_wrong_arg_count_is_fatal() {
    let mut env = env();
    env.setvar("g", pipeline(&["n"], |_| Ok(r#gen(1).into_pipeline())));
    let err = gather(&mut env, runpipeline("g", Vec::new())).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(env.namespace().depth(), 1);
}

#[test]
fn test_runpipeline_scope_popped_after_error() {
    let mut env = env();
    let kill = func("x: stop", |_| Err(EvalError::KillCommand("stop".to_string())));
    env.setvar(
        "p",
        pipeline(&["n"], move |_| Ok((r#gen(Arg::var("n")) | map(kill.clone())).into_pipeline())),
    );
    let err = gather(&mut env, runpipeline("p", vec![Arg::from(3)])).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(env.namespace().depth(), 1);
}

#[test]
fn test_runpipeline_in_the_middle_receives_records() {
    let mut env = env();
    let body = PipelineWrapper::interactive(map(inc()).into_pipeline());
    env.setvar("inc", Value::Pipeline(Arc::new(body)));
    let items = gather(&mut env, r#gen(3) | runpipeline("inc", Vec::new())).unwrap();
    assert_eq!(values(&items), ints(&[1, 2, 3]));
}

#[test]
fn test_runpipeline_requires_pipeline_value() {
    let mut env = env();
    env.setvar("x", Value::Int(1));
    assert!(gather(&mut env, runpipeline("x", Vec::new())).unwrap_err().is_fatal());
}

// --- Pipeline engine ---

#[test]
fn test_copy_isolation_positions_diverge() {
    let mut env = env();
    let buffer = Collected::new();
    let mut p: Pipeline = (r#gen(3) | map(inc()) | collect(&buffer)).into();
    p.set_error_handler(logging_handler());
    let q = p.copy();
    assert_ne!(p.id(), q.id());
    p.execute(&mut env, None).unwrap();
    assert_eq!(p.positions(), vec![0, 3, 3]);
    assert_eq!(q.positions(), vec![0, 0, 0]);
    assert!(!q.is_ready());
}

#[test]
fn test_copies_run_concurrently_with_own_state() {
    let mut p = Pipeline::from_ops(vec![
        Box::new(Gen::new(Arg::var("n")).start(Arg::var("s"))),
        Box::new(Map::new(inc())),
    ]);
    p.set_error_handler(logging_handler());
    let mut q = p.copy();
    let (p_out, q_out) = (Collected::new(), Collected::new());
    p.append(Box::new(Collect::with_buffer(p_out.clone())));
    q.append(Box::new(Collect::with_buffer(q_out.clone())));

    let mut p_env = env();
    p_env.setvar("n", Value::Int(3));
    p_env.setvar("s", Value::Int(0));
    let mut q_env = env();
    q_env.setvar("n", Value::Int(500));
    q_env.setvar("s", Value::Int(1000));

    thread::scope(|scope| {
        let p_run = scope.spawn(|| p.execute(&mut p_env, None));
        let q_run = scope.spawn(|| q.execute(&mut q_env, None));
        p_run.join().unwrap().unwrap();
        q_run.join().unwrap().unwrap();
    });

    assert_eq!(p.positions(), vec![0, 3, 3]);
    assert_eq!(q.positions(), vec![0, 500, 500]);
    assert_eq!(p_out.values(), ints(&[1, 2, 3]));
    let expected: Vec<i64> = (1001..=1500).collect();
    assert_eq!(q_out.values(), ints(&expected));
}

#[test]
fn test_setup_requires_error_handler() {
    let mut env = env();
    let mut p = r#gen(1).into_pipeline();
    let err = p.setup(&mut env).unwrap_err();
    assert!(err.to_string().contains("error handler"));
}

#[test]
fn test_setup_rejects_source_after_first() {
    let mut env = env();
    let err = run(&mut env, map(inc()) | r#gen(3)).unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("cannot receive input from a pipe"));
}

#[test]
fn test_non_source_cannot_run_first() {
    let mut env = env();
    let err = run(&mut env, map(inc())).unwrap_err();
    assert_eq!(
        err.to_string(),
        "map cannot be the first operator in a pipeline"
    );
}

#[test]
fn test_empty_pipeline_is_fatal() {
    let mut env = env();
    assert!(run(&mut env, Pipeline::new()).unwrap_err().is_fatal());
}

#[test]
fn test_setup_error_in_op_is_fatal() {
    let mut env = env();
    let err = run(&mut env, r#gen(Arg::var("undefined"))).unwrap_err();
    assert!(err.to_string().contains("undefined"));
    assert!(run(&mut env, r#gen(-1)).unwrap_err().is_fatal());
}

#[test]
fn test_kill_command_aborts_pipeline() {
    let mut env = env();
    let buffer = Collected::new();
    let kill = func("x: stop", |a| match a[0].as_int() {
        Some(2) => Err(EvalError::KillCommand("stop".to_string())),
        _ => Ok(a[0].clone()),
    });
    let err = run(&mut env, r#gen(5) | map(kill) | collect(&buffer)).unwrap_err();
    assert!(matches!(err, OpError::Fatal(ref m) if m == "map: record 3: stop"));
    assert_eq!(buffer.values(), ints(&[0, 1]));
}

#[test]
fn test_fatal_names_only_the_failing_op() {
    let mut env = env();
    let same = func("x: x", |a| Ok(a[0].clone()));
    let kill = func("x: stop", |a| match a[0].as_int() {
        Some(1) => Err(EvalError::KillCommand("stop".to_string())),
        _ => Ok(a[0].clone()),
    });
    let err = run(&mut env, r#gen(3) | map(same) | map(kill)).unwrap_err();
    assert_eq!(err.to_string(), "map: record 2: stop");
}

#[test]
fn test_cancellation_stops_source() {
    let mut env = env();
    env.cancel();
    assert!(matches!(run(&mut env, r#gen(3)), Err(OpError::Cancelled)));
}

#[test]
fn test_cleanup_runs_once() {
    let mut env = env();
    let count = Arc::new(AtomicUsize::new(0));
    let mut p: Pipeline = (r#gen(2) | Node::op(CleanupCounter(Arc::clone(&count)))).into();
    p.set_error_handler(logging_handler());
    p.execute(&mut env, None).unwrap();
    p.cleanup();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cleanup_runs_after_failure() {
    let mut env = env();
    let count = Arc::new(AtomicUsize::new(0));
    let kill = func("x: stop", |_| Err(EvalError::KillCommand("stop".to_string())));
    let result = run(
        &mut env,
        r#gen(2) | map(kill) | Node::op(CleanupCounter(Arc::clone(&count))),
    );
    assert!(result.is_err());
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_receive_none_runs_source() {
    let mut env = env();
    let buffer = Collected::new();
    let mut p: Pipeline = (gen_from(2, 10) | collect(&buffer)).into();
    p.set_error_handler(logging_handler());
    p.setup(&mut env).unwrap();
    p.receive(&mut env, None, None).unwrap();
    p.flush(&mut env, None).unwrap();
    p.cleanup();
    assert_eq!(buffer.values(), ints(&[10, 11]));
}

#[test]
fn test_receive_record_feeds_first_op() {
    let mut env = env();
    let buffer = Collected::new();
    let mut p: Pipeline = (map(inc()) | collect(&buffer)).into();
    p.set_error_handler(logging_handler());
    p.setup(&mut env).unwrap();
    p.receive(&mut env, Some(Record::from(41)), None).unwrap();
    assert_eq!(buffer.values(), ints(&[42]));
}

// --- Node ---

#[test]
fn test_node_flattens_in_order() {
    let buffer = Collected::new();
    let left = r#gen(3) | map(inc());
    let right = select(inc()) | collect(&buffer);
    let p = (left | right).into_pipeline();
    assert_eq!(p.op_names(), vec!["gen", "map", "select", "collect"]);
    assert_eq!(p.to_string(), "gen | map | select | collect");
}

#[test]
fn test_node_splices_pipelines() {
    let inner = (map(inc()) | map(inc())).into_pipeline();
    let p = (r#gen(1) | Node::from(inner)).into_pipeline();
    assert_eq!(p.len(), 3);
}

// --- Leaf ops ---

#[test]
fn test_select_keeps_truthy() {
    let mut env = env();
    let odd = func("x: x % 2", |a| Ok(Value::Int(a[0].as_int().unwrap_or(0) % 2)));
    let items = gather(&mut env, r#gen(5) | select(odd)).unwrap();
    assert_eq!(values(&items), ints(&[1, 3]));
}

#[test]
fn test_store_then_load() {
    let mut env = env();
    run(&mut env, r#gen(3) | store("xs")).unwrap();
    assert_eq!(env.getvar("xs"), Ok(&Value::List(ints(&[0, 1, 2]))));
    let items = gather(&mut env, load("xs") | map(inc())).unwrap();
    assert_eq!(values(&items), ints(&[1, 2, 3]));
}

#[test]
fn test_load_requires_list() {
    let mut env = env();
    env.setvar("n", Value::Int(1));
    assert!(run(&mut env, load("n")).unwrap_err().is_fatal());
}

#[test]
fn test_collect_copy_shares_buffer() {
    let buffer = Collected::new();
    let op = Collect::with_buffer(buffer.clone());
    let copy = op.copy();
    assert!(copy.is_sink());
    assert!(buffer.is_empty());
}

#[test]
fn test_ls_lists_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "a").unwrap();
    std::fs::write(dir.path().join("b.txt"), "b").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub").join("c.txt"), "c").unwrap();
    let root = dir.path().to_str().unwrap();

    let mut env = env();
    let flat = values(&gather(&mut env, ls(&[root], false)).unwrap());
    assert_eq!(flat.len(), 3);
    let deep = values(&gather(&mut env, ls(&[root], true)).unwrap());
    assert_eq!(deep.len(), 4);
    assert!(deep.iter().any(|v| v.to_string().ends_with("c.txt\"")));
}

#[test]
fn test_ls_relative_to_current_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("only.txt"), "x").unwrap();
    let mut env = env();
    env.set_current_dir(dir.path());
    let items = gather(&mut env, ls(&[], false)).unwrap();
    assert_eq!(items.len(), 1);
    let file = gather(&mut env, ls(&["only.txt"], false)).unwrap();
    assert_eq!(file.len(), 1);
}

#[test]
fn test_ls_missing_path_is_an_error_entry() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    let mut env = env();
    let items = gather(&mut env, ls(&[missing.to_str().unwrap()], false)).unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0].is_error());
}

// --- Command ---

#[test]
fn test_command_returns_env_delta() {
    let mut env = env();
    let mut command = Command::new(
        Some("gen 2 | store ys".to_string()),
        (r#gen(2) | store("ys")).into(),
    );
    assert_eq!(command.pipeline().op_names(), vec!["gen", "store"]);
    let delta = command.execute(&mut env).unwrap();
    assert_eq!(delta.vars.get("ys"), Some(&Value::List(ints(&[0, 1]))));
    assert!(delta.current_dir.is_none());
}

#[test]
fn test_command_appends_write() {
    let command = Command::new(None, r#gen(1).into());
    assert_eq!(command.pipeline().op_names(), vec!["gen", "write"]);
}

#[test]
fn test_command_counts_resumable_errors() {
    let mut env = env();
    let buffer = Collected::new();
    let mut command = Command::new(None, (r#gen(3) | map(ten_over()) | collect(&buffer)).into());
    command.execute(&mut env).unwrap();
    assert_eq!(command.resumable_errors(), 1);
    assert_eq!(buffer.errors().len(), 1);
}

// --- Serialization ---

const SPEC_JSON: &str = r#"{"ops":[{"op":"gen","count":{"literal":3}},{"op":"map","function":{"source":"x: x + 1"}},{"op":"write"}]}"#;

#[test]
fn test_spec_builds_pipeline() {
    let spec = PipelineSpec::from_json(SPEC_JSON).unwrap();
    let p = spec.build();
    assert_eq!(p.op_names(), vec!["gen", "map", "write"]);
    let again = p.to_spec().unwrap().to_json().unwrap();
    assert_eq!(PipelineSpec::from_json(&again).unwrap().ops.len(), 3);
}

#[test]
fn test_spec_params_and_var_args() {
    let json = r#"{"params":["n"],"ops":[{"op":"gen","count":{"var":"n"}}]}"#;
    let p = PipelineSpec::from_json(json).unwrap().build();
    assert_eq!(p.params(), Some(&["n".to_string()][..]));
}

#[test]
fn test_collect_cannot_be_serialized() {
    let buffer = Collected::new();
    let p = (r#gen(1) | collect(&buffer)).into_pipeline();
    assert!(p.to_spec().unwrap_err().is_fatal());
}

#[test]
fn test_remote_message_lines() {
    let line = RemoteMessage::Record(Record::from(1)).encode_line().unwrap();
    assert_eq!(line, r#"{"kind":"record","data":[1]}"#);
    assert_eq!(
        RemoteMessage::decode_line("{\"kind\":\"end\"}\n").unwrap(),
        RemoteMessage::End
    );
}

fn request(ops: &str, vars: &[(&str, Value)]) -> RemoteRequest {
    RemoteRequest {
        pipeline: PipelineSpec::from_json(&format!(r#"{{"ops":{ops}}}"#)).unwrap(),
        env: EnvSnapshot {
            current_dir: "/".into(),
            vars: vars.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        },
    }
}

fn remote_lines(request: RemoteRequest) -> Vec<RemoteMessage> {
    let out = JsonLines::new(Vec::new());
    run_request(request, Config::default(), &out).unwrap();
    String::from_utf8(out.into_inner())
        .unwrap()
        .lines()
        .map(|l| RemoteMessage::decode_line(l).unwrap())
        .collect()
}

#[test]
fn test_run_request_streams_records_then_end() {
    let lines = remote_lines(request(
        r#"[{"op":"load","var":"xs"}]"#,
        &[("xs", Value::List(ints(&[5, 6])))],
    ));
    assert_eq!(
        lines,
        vec![
            RemoteMessage::Record(Record::from(5)),
            RemoteMessage::Record(Record::from(6)),
            RemoteMessage::End,
        ]
    );
}

#[test]
fn test_run_request_reports_fatal() {
    let lines = remote_lines(request(
        r#"[{"op":"gen","count":{"literal":2}},{"op":"map","function":{"source":"x: x"}}]"#,
        &[],
    ));
    assert_eq!(lines.len(), 1);
    assert!(matches!(lines[0], RemoteMessage::Fatal(_)));
}

// --- Shell input ---

#[test]
fn test_parse_builtins() {
    assert!(matches!(parse_line("jobs").unwrap(), ShellLine::Jobs));
    assert!(matches!(parse_line("fg 2").unwrap(), ShellLine::Foreground(2)));
    assert!(matches!(parse_line(" bg 1 ").unwrap(), ShellLine::Background(1)));
    assert!(matches!(parse_line("kill 3").unwrap(), ShellLine::Kill(3)));
    assert!(matches!(parse_line("exit").unwrap(), ShellLine::Exit));
    assert!(parse_line("kill x").is_err());
    assert!(parse_line("fg").is_err());
    assert!(parse_line("frobnicate").is_err());
}

#[test]
fn test_parse_pipeline_lines() {
    match parse_line(&format!("{SPEC_JSON} &")).unwrap() {
        ShellLine::Run { spec, background, .. } => {
            assert!(background);
            assert_eq!(spec.ops.len(), 3);
        }
        other => panic!("unexpected {other:?}"),
    }
    match parse_line(&format!("p = {SPEC_JSON}")).unwrap() {
        ShellLine::Assign { var, .. } => assert_eq!(var, "p"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_map_copy_keeps_function() {
    let map_op = Map::new(inc());
    let copy = map_op.copy();
    assert_eq!(copy.name(), "map");
}
