//! Stage registry, binding and guest stages against on-disk fixtures.

use std::path::Path;
use std::sync::Arc;

use relaybyte_engine::config::TransformerSpec;
use relaybyte_engine::statistics::report::keys;
use relaybyte_engine::{
    build_stages, Communication, EngineError, LoggingCollector, TransformPipeline,
    TransformerRegistry,
};
use relaybyte_runtime::scope;
use relaybyte_runtime::{GuestLimits, PluginLoader, PluginRoots};
use relaybyte_types::{Column, PluginKind, Record};

/// A guest whose `evaluate` returns one string column holding `text`.
fn constant_stage(text: &str) -> String {
    let json = format!(r#"[{{"type":"string","value":"{text}"}}]"#);
    let packed = (64_i64 << 32) | i64::try_from(json.len()).unwrap();
    format!(
        r#"(module
            (memory (export "memory") 1)
            (data (i32.const 64) "{data}")
            (func (export "rx_alloc") (param i32) (result i32) i32.const 1024)
            (func (export "evaluate") (param i32 i32) (result i64)
                i64.const {packed}))"#,
        data = json.replace('"', "\\\"")
    )
}

/// A guest that hands its input back unchanged.
const ECHO: &str = r#"(module
    (memory (export "memory") 1)
    (func (export "rx_alloc") (param i32) (result i32) i32.const 1024)
    (func (export "evaluate") (param $ptr i32) (param $len i32) (result i64)
        (i64.or
            (i64.shl (i64.extend_i32_u (local.get $ptr)) (i64.const 32))
            (i64.extend_i32_u (local.get $len)))))"#;

/// A guest that rejects every record with a message.
const REJECT: &str = r#"(module
    (memory (export "memory") 1)
    (data (i32.const 128) "bad input")
    (func (export "rx_alloc") (param i32) (result i32) i32.const 1024)
    (func (export "rx_last_error") (result i64) i64.const 549755813897)
    (func (export "evaluate") (param i32 i32) (result i64) i64.const -1))"#;

/// A guest that filters every record.
const DROP: &str = r#"(module
    (memory (export "memory") 1)
    (func (export "rx_alloc") (param i32) (result i32) i32.const 1024)
    (func (export "evaluate") (param i32 i32) (result i64) i64.const 0))"#;

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn descriptor(name: &str) -> String {
    format!(r#"{{"name":"{name}","entry":"evaluate"}}"#)
}

fn fixture() -> (tempfile::TempDir, TransformerRegistry) {
    let home = tempfile::tempdir().unwrap();
    let root = home.path();
    // The host scope also exports `evaluate`; plugin scopes must shadow it.
    write(&root.join("lib/host.wat"), &constant_stage("host"));
    for (name, source) in [
        ("alpha", constant_stage("alpha")),
        ("beta", constant_stage("beta")),
        ("echo", ECHO.to_string()),
        ("reject", REJECT.to_string()),
        ("drop", DROP.to_string()),
    ] {
        write(&root.join(format!("transformer/{name}/transformer.json")), &descriptor(name));
        write(&root.join(format!("transformer/{name}/{name}.wat")), &source);
    }
    write(&root.join("transformer/broken/transformer.json"), &descriptor("broken"));
    write(&root.join("transformer/broken/broken.wat"), "(module (func $oops");
    write(&root.join("transformer/dx_bad/transformer.json"), &descriptor("dx_bad"));
    write(&root.join("transformer/dx_bad/bad.wat"), ECHO);

    let loader = PluginLoader::new(PluginRoots::new(root), GuestLimits::default()).unwrap();
    let registry = TransformerRegistry::with_builtins(Arc::new(loader)).unwrap();
    (home, registry)
}

fn spec(name: &str) -> TransformerSpec {
    TransformerSpec {
        name: name.to_string(),
        ..TransformerSpec::default()
    }
}

fn pipeline(
    specs: &[TransformerSpec],
    registry: &TransformerRegistry,
) -> (TransformPipeline, Arc<LoggingCollector>) {
    let stages = build_stages(specs, registry).unwrap();
    let collector = Arc::new(LoggingCollector::new(
        PluginKind::Reader,
        Arc::new(Communication::new()),
    ));
    (TransformPipeline::new(stages, collector.clone()), collector)
}

fn first_column(record: &Record) -> String {
    record.column(0).and_then(Column::as_string).unwrap()
}

#[test]
fn builtins_are_seeded() {
    let (_home, registry) = fixture();
    assert_eq!(
        registry.names(),
        vec!["dx_filter", "dx_map", "dx_pad", "dx_replace", "dx_script", "dx_substr"]
    );
    assert!(registry.get("dx_filter").unwrap().builtin);
}

#[test]
fn local_loading_skips_failures() {
    let (_home, registry) = fixture();
    let loaded = registry.load_local_all();
    assert_eq!(loaded, 5);
    assert!(registry.contains("alpha"));
    assert!(!registry.contains("broken"));
    assert!(!registry.contains("dx_bad"));
    assert!(registry.get("alpha").unwrap().scope.is_some());
    assert_eq!(registry.load_local_all(), 0);
}

#[test]
fn reserved_prefix_and_duplicates_are_rejected() {
    let (_home, registry) = fixture();
    let err = registry.load_local("dx_bad").unwrap_err();
    assert!(err.to_string().contains("must not start with 'dx_'"));
    registry.load_local("alpha").unwrap();
    let err = registry.load_local("alpha").unwrap_err();
    assert!(err.to_string().contains("already registered"));
}

#[test]
fn external_stages_run_in_their_own_scope() {
    let (_home, registry) = fixture();
    let (mut alpha, _) = pipeline(&[spec("alpha")], &registry);
    let (mut beta, _) = pipeline(&[spec("beta")], &registry);
    let input = Record::from_columns(vec![Column::from("x")]);

    let out = alpha.evaluate(input.clone()).unwrap().unwrap();
    assert_eq!(first_column(&out), "alpha");
    let out = beta.evaluate(input).unwrap().unwrap();
    assert_eq!(first_column(&out), "beta");

    assert!(scope::current().is_none());
}

#[test]
fn guest_outcomes_map_to_pipeline_counters() {
    let (_home, registry) = fixture();
    let (mut p, collector) = pipeline(&[spec("echo"), spec("reject")], &registry);
    let input = Record::from_columns(vec![Column::Long(3)]);
    assert!(p.evaluate(input).unwrap().is_none());
    assert_eq!(p.stats().failed, 1);
    let dirty = collector.drain();
    assert_eq!(dirty[0].message, "transformer(reject) has Exception(bad input)");

    let (mut p, _) = pipeline(&[spec("echo"), spec("drop")], &registry);
    assert!(p.evaluate(Record::from_columns(vec![Column::Long(3)])).unwrap().is_none());
    assert_eq!(p.stats().filtered, 1);

    let (mut p, _) = pipeline(&[spec("echo")], &registry);
    let out = p.evaluate(Record::from_columns(vec![Column::Long(3)])).unwrap().unwrap();
    assert_eq!(out.columns(), &[Column::Long(3)]);
}

#[test]
fn unknown_stage_is_fatal() {
    let (_home, registry) = fixture();
    let err = build_stages(&[spec("nowhere")], &registry).unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("'nowhere' is not registered"));

    let err = build_stages(&[spec("broken")], &registry).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn builtin_parameters_checked_at_bind() {
    let (_home, registry) = fixture();
    let mut filter = spec("dx_filter");
    filter.column_index = Some(0);
    filter.params = vec![">".to_string()];
    let err = build_stages(&[filter], &registry).unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
    assert!(err.to_string().contains("missing required parameter #1"));
}

#[test]
fn script_stage_compiles_inline_code() {
    let (_home, registry) = fixture();
    let mut script = spec("dx_script");
    script.code = Some(constant_stage("scripted"));
    let (mut p, _) = pipeline(&[script], &registry);
    let out = p.evaluate(Record::from_columns(vec![Column::Null])).unwrap().unwrap();
    assert_eq!(first_column(&out), "scripted");
}

#[test]
fn script_stage_reads_code_file() {
    let (home, registry) = fixture();
    let path = home.path().join("script.wat");
    write(&path, ECHO);
    let mut script = spec("dx_script");
    script.code_file = Some(path);
    let (mut p, _) = pipeline(&[script], &registry);
    let out = p.evaluate(Record::from_columns(vec![Column::from("kept")])).unwrap().unwrap();
    assert_eq!(first_column(&out), "kept");
}

#[test]
fn script_stage_rules() {
    let (_home, registry) = fixture();
    let mut script = spec("dx_script");
    script.code = Some(ECHO.to_string());
    let err = build_stages(&[script.clone(), script], &registry).unwrap_err();
    assert!(err.to_string().contains("at most once"));

    let mut bad = spec("dx_script");
    bad.code = Some("(module (func".to_string());
    assert!(build_stages(&[bad], &registry).unwrap_err().is_config());

    let mut no_entry = spec("dx_script");
    no_entry.code = Some("(module)".to_string());
    assert!(build_stages(&[no_entry], &registry).unwrap_err().is_config());
}

#[test]
fn stage_statistics_reach_communication() {
    let (_home, registry) = fixture();
    let (mut p, _) = pipeline(&[spec("echo")], &registry);
    for n in 0..3 {
        p.evaluate(Record::from_columns(vec![Column::Long(n)])).unwrap();
    }
    let comm = Communication::new();
    p.publish_stats(&comm);
    assert_eq!(comm.long_counter(keys::TRANSFORMER_SUCCESS_RECORDS), 3);
    assert!(comm.long_counter(keys::TRANSFORMER_USED_TIME) > 0);
}
