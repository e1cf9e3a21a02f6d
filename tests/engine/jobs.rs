//! Job queue tests

use super::{create_test_context, take_error};
use qjs_core::{Context, ErrorKind, JsError, JsResult, JsValue};

fn record(ctx: &Context, args: &[JsValue]) -> JsResult<JsValue> {
    let global = JsValue::Object(ctx.global_object());
    let log = ctx.get_property_str(&global, "log")?;
    let Some(log) = log.as_object() else {
        return Err(ctx.throw_type_error("log is missing"));
    };
    ctx.array_push(log, args.first().cloned().unwrap_or_default())?;
    Ok(JsValue::Undefined)
}

fn record_then_requeue(ctx: &Context, args: &[JsValue]) -> JsResult<JsValue> {
    record(ctx, args)?;
    ctx.enqueue_job(record, &[JsValue::from("requeued")]);
    Ok(JsValue::Undefined)
}

fn fail(ctx: &Context, _args: &[JsValue]) -> JsResult<JsValue> {
    Err(ctx.throw_error(ErrorKind::Error, "job failed"))
}

fn install_log(ctx: &Context) -> qjs_core::JsObjectRef {
    let log = ctx.new_array().unwrap();
    ctx.set_property_str(
        &JsValue::Object(ctx.global_object()),
        "log",
        JsValue::Object(log.clone()),
    )
    .unwrap();
    log
}

#[test]
fn test_jobs_run_in_fifo_order() {
    let ctx = create_test_context();
    let log = install_log(&ctx);
    let rt = ctx.runtime();

    assert!(!rt.is_job_pending());
    for i in 0..3 {
        ctx.enqueue_job(record, &[JsValue::from(i)]);
    }
    assert_eq!(rt.pending_job_count(), 3);

    while rt.execute_pending_job().unwrap() {}
    assert!(!rt.is_job_pending());
    assert_eq!(ctx.to_string(&JsValue::Object(log)).unwrap(), "0,1,2");
    assert!(!rt.execute_pending_job().unwrap());
}

#[test]
fn test_jobs_enqueued_while_draining_also_run() {
    let ctx = create_test_context();
    let log = install_log(&ctx);
    ctx.enqueue_job(record_then_requeue, &[JsValue::from("first")]);
    ctx.enqueue_job(record, &[JsValue::from("second")]);

    assert_eq!(ctx.runtime().run_pending_jobs(), 0);
    assert_eq!(
        ctx.to_string(&JsValue::Object(log)).unwrap(),
        "first,second,requeued"
    );
}

#[test]
fn test_failed_job_leaves_exception() {
    let ctx = create_test_context();
    let rt = ctx.runtime();
    ctx.enqueue_job(fail, &[]);
    let err = rt.execute_pending_job().unwrap_err();
    assert_eq!(err, JsError::Exception);
    let (kind, message) = take_error(&ctx, err);
    assert_eq!(kind, ErrorKind::Error);
    assert_eq!(message, "job failed");
}

#[test]
fn test_drain_counts_failures_and_continues() {
    let ctx = create_test_context();
    let log = install_log(&ctx);
    ctx.enqueue_job(fail, &[]);
    ctx.enqueue_job(record, &[JsValue::from("after")]);
    ctx.enqueue_job(fail, &[]);

    assert_eq!(ctx.runtime().run_pending_jobs(), 2);
    assert!(!ctx.has_exception());
    assert_eq!(ctx.to_string(&JsValue::Object(log)).unwrap(), "after");
}

#[test]
fn test_job_runs_in_its_own_realm() {
    let ctx = create_test_context();
    let other = Context::new(ctx.runtime()).unwrap();
    let log = install_log(&other);
    other.enqueue_job(record, &[JsValue::from("other realm")]);

    // Drained through the first context's runtime handle
    assert_eq!(ctx.runtime().run_pending_jobs(), 0);
    assert_eq!(ctx.to_string(&JsValue::Object(log)).unwrap(), "other realm");
    assert_eq!(
        ctx.get_property_str(&JsValue::Object(ctx.global_object()), "log")
            .unwrap(),
        JsValue::Undefined
    );
}
