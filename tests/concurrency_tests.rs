use std::sync::Arc;
use std::thread;

use exprhost::{
    ArtifactCache, ExpressionCompiler, TypeInfo, TypeRegistry, Value, ValueType, VariableContext,
};

fn telemetry_type() -> Arc<TypeInfo> {
    TypeInfo::builder("Telemetry")
        .module("telemetry")
        .property("signal", ValueType::Float)
        .build()
}

#[test]
fn test_concurrent_shape_generation_converges() {
    let registry = Arc::new(TypeRegistry::new());
    registry
        .register_symbol("gain", ValueType::Float, Value::Float(1.0))
        .unwrap();
    let instance = telemetry_type();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            let instance = instance.clone();
            thread::spawn(move || {
                registry
                    .context_shape(ValueType::Float, &instance, None)
                    .unwrap()
            })
        })
        .collect();

    let shapes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Every thread observed the same hash; the cached entry is canonical
    // for all later callers.
    let canonical = registry
        .context_shape(ValueType::Float, &instance, None)
        .unwrap();
    for shape in &shapes {
        assert_eq!(shape.hash(), canonical.hash());
    }
    assert!(shapes.iter().any(|s| Arc::ptr_eq(s, &canonical)));
}

#[test]
fn test_concurrent_distinct_keys_do_not_interfere() {
    let registry = Arc::new(TypeRegistry::new());
    let instance = telemetry_type();
    let results = [ValueType::Bool, ValueType::Int, ValueType::Float, ValueType::Str];

    let handles: Vec<_> = results
        .iter()
        .map(|&result| {
            let registry = registry.clone();
            let instance = instance.clone();
            thread::spawn(move || {
                let shape = registry.context_shape(result, &instance, None).unwrap();
                (result, shape)
            })
        })
        .collect();

    let mut hashes = Vec::new();
    for handle in handles {
        let (result, shape) = handle.join().unwrap();
        assert_eq!(shape.result_type(), result);
        hashes.push(shape.hash());
    }
    hashes.sort();
    hashes.dedup();
    assert_eq!(hashes.len(), results.len());
}

#[test]
fn test_shared_artifact_cache_under_contention() {
    let artifacts = Arc::new(ArtifactCache::in_memory());
    let instance = telemetry_type();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let artifacts = artifacts.clone();
            let instance = instance.clone();
            thread::spawn(move || {
                // Each thread has a private registry; structural state is
                // identical, so all of them key the same artifact.
                let registry = TypeRegistry::with_artifact_cache(artifacts);
                registry
                    .context_shape(ValueType::Float, &instance, None)
                    .unwrap()
                    .hash()
            })
        })
        .collect();

    let mut hashes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    hashes.dedup();
    assert_eq!(hashes.len(), 1);
    assert_eq!(artifacts.len(), 1);
}

#[test]
fn test_concurrent_execution_of_one_compiler() {
    let vars = Arc::new(VariableContext::new(Value::Float(0.0)));
    vars.set("base", Value::Float(3.0));

    let mut compiler = ExpressionCompiler::new("base * base").unwrap();
    compiler.set_variables(vars);
    let compiler = Arc::new(compiler);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let compiler = compiler.clone();
            thread::spawn(move || compiler.execute_function().unwrap())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Value::Float(9.0));
    }
}

#[test]
fn test_value_updates_race_safely_with_execution() {
    let registry = Arc::new(TypeRegistry::new());
    registry
        .register_symbol("level", ValueType::Int, Value::Int(0))
        .unwrap();

    let mut compiler = ExpressionCompiler::new("level >= 0").unwrap();
    compiler.set_registry(registry.clone());
    let compiler = Arc::new(compiler);

    let writer = {
        let registry = registry.clone();
        thread::spawn(move || {
            for i in 0..100 {
                registry.set_symbol_value("level", Value::Int(i)).unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let compiler = compiler.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    // Values only ever move through non-negative ints, so
                    // every interleaving observes true.
                    assert_eq!(compiler.execute_function().unwrap(), Value::Bool(true));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}
