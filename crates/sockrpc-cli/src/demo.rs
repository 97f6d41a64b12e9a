//! The demo backend served by `sockrpc serve`.
//!
//! ```text
//! greet(name)          -> "Hello, {name}!"
//! math.add(a, b)       -> a + b
//! math.subtract(a, b)  -> a - b
//! countTo(n)           yields 1..n-1, returns n
//! echo(...args)        -> args
//! ```

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::json;
use sockrpc_common::{Args, Value};
use sockrpc_server::Module;

/// Pause between two `countTo` steps.
pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(1000);

/// Builds the demo module; `step_delay` is slept after every `countTo` yield.
pub fn backend(step_delay: Duration) -> Module {
    Module::new()
        .sync_function("greet", |args| {
            let name = string_arg(&args, 0)?;
            Ok(json!(format!("Hello, {}!", name)))
        })
        .module(
            "math",
            Module::new()
                .sync_function("add", |args| arithmetic(&args, i64::checked_add, |a, b| a + b))
                .sync_function("subtract", |args| arithmetic(&args, i64::checked_sub, |a, b| a - b)),
        )
        .coroutine("countTo", move |args, yielder| async move {
            let n = integer_arg(&args, 0)?;
            for i in 1..n {
                yielder.yield_(json!(i)).await;
                if !step_delay.is_zero() {
                    tokio::time::sleep(step_delay).await;
                }
            }
            Ok(json!(n))
        })
        .sync_function("echo", |args| Ok(Value::Array(args)))
}

fn arg(args: &Args, index: usize) -> Result<&Value> {
    args.get(index).ok_or_else(|| anyhow!("missing argument {}", index))
}

fn string_arg(args: &Args, index: usize) -> Result<&str> {
    arg(args, index)?
        .as_str()
        .ok_or_else(|| anyhow!("argument {} must be a string", index))
}

fn integer_arg(args: &Args, index: usize) -> Result<i64> {
    arg(args, index)?
        .as_i64()
        .ok_or_else(|| anyhow!("argument {} must be an integer", index))
}

fn number_arg(args: &Args, index: usize) -> Result<f64> {
    arg(args, index)?
        .as_f64()
        .ok_or_else(|| anyhow!("argument {} must be a number", index))
}

/// Integer arithmetic when both operands are integers and the result fits,
/// floating point otherwise.
fn arithmetic(args: &Args, int_op: fn(i64, i64) -> Option<i64>, float_op: fn(f64, f64) -> f64) -> Result<Value> {
    let (a, b) = (arg(args, 0)?, arg(args, 1)?);
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        if let Some(result) = int_op(a, b) {
            return Ok(json!(result));
        }
    }
    Ok(json!(float_op(number_arg(args, 0)?, number_arg(args, 1)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sockrpc_server::{Leaf, Step};

    async fn call(module: &Module, path: &str, args: Args) -> Result<Value> {
        match module.lookup(path) {
            Some(Leaf::Function(handler)) => handler(args).await,
            _ => panic!("{} is not a function", path),
        }
    }

    #[test]
    fn test_schema() {
        let schema = serde_json::to_value(backend(Duration::ZERO).schema()).unwrap();
        assert_eq!(
            schema,
            json!({
                "countTo": "generator",
                "echo": "function",
                "greet": "function",
                "math": {"add": "function", "subtract": "function"}
            })
        );
    }

    #[tokio::test]
    async fn test_greet() {
        let module = backend(Duration::ZERO);
        assert_eq!(call(&module, "greet", vec![json!("world")]).await.unwrap(), json!("Hello, world!"));

        let err = call(&module, "greet", vec![json!(1)]).await.unwrap_err();
        assert_eq!(err.to_string(), "argument 0 must be a string");
        let err = call(&module, "greet", vec![]).await.unwrap_err();
        assert_eq!(err.to_string(), "missing argument 0");
    }

    #[tokio::test]
    async fn test_math() {
        let module = backend(Duration::ZERO);
        assert_eq!(call(&module, "math.add", vec![json!(1), json!(2)]).await.unwrap(), json!(3));
        assert_eq!(call(&module, "math.subtract", vec![json!(1), json!(5)]).await.unwrap(), json!(-4));
        assert_eq!(call(&module, "math.add", vec![json!(0.5), json!(2)]).await.unwrap(), json!(2.5));
        assert_eq!(
            call(&module, "math.add", vec![json!(i64::MAX), json!(1)]).await.unwrap(),
            json!(i64::MAX as f64 + 1.0)
        );
        assert!(call(&module, "math.add", vec![json!("1"), json!(2)]).await.is_err());
    }

    #[tokio::test]
    async fn test_echo() {
        let module = backend(Duration::ZERO);
        let args = vec![json!(1), json!({"nested": [true, null]})];
        assert_eq!(call(&module, "echo", args.clone()).await.unwrap(), Value::Array(args));
    }

    #[tokio::test]
    async fn test_count_to() {
        let module = backend(Duration::ZERO);
        let Some(Leaf::Generator(factory)) = module.lookup("countTo") else {
            panic!("countTo is not a generator");
        };

        let mut generator = factory(vec![json!(4)]).unwrap();
        let mut steps = Vec::new();
        loop {
            let step = generator.resume(None).await.unwrap();
            let done = step.is_return();
            steps.push(step);
            if done {
                break;
            }
        }
        assert_eq!(
            steps,
            vec![
                Step::Yield(json!(1)),
                Step::Yield(json!(2)),
                Step::Yield(json!(3)),
                Step::Return(json!(4)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_to_waits_between_steps() {
        let module = backend(Duration::from_secs(1));
        let Some(Leaf::Generator(factory)) = module.lookup("countTo") else {
            panic!("countTo is not a generator");
        };

        let mut generator = factory(vec![json!(3)]).unwrap();
        let started = tokio::time::Instant::now();
        assert_eq!(generator.resume(None).await.unwrap(), Step::Yield(json!(1)));
        assert_eq!(generator.resume(None).await.unwrap(), Step::Yield(json!(2)));
        assert_eq!(generator.resume(None).await.unwrap(), Step::Return(json!(3)));
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_count_to_rejects_bad_argument() {
        let module = backend(Duration::ZERO);
        let Some(Leaf::Generator(factory)) = module.lookup("countTo") else {
            panic!("countTo is not a generator");
        };

        let mut generator = factory(vec![json!("ten")]).unwrap();
        let err = generator.resume(None).await.unwrap_err();
        assert_eq!(err.to_string(), "argument 0 must be an integer");
    }
}
