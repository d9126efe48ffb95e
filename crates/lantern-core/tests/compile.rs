use lantern_core::ast::{Function, Value};
use lantern_core::error::LanternError;
use lantern_core::eval::Interp;

fn interp_with(src: &str) -> Interp {
    let mut interp = Interp::new();
    interp.eval_source(src).unwrap();
    interp
}

fn assert_compiled(interp: &Interp, name: &str) {
    assert!(
        matches!(interp.function(name), Some(Function::Compiled(_))),
        "{} should be compiled",
        name
    );
}

/// Every supported construct must produce identical results before
/// and after compilation, for the same arguments.
fn assert_transparent(defun: &str, name: &str, calls: &[&str]) {
    let mut interp = interp_with(defun);
    let before: Vec<Value> = calls
        .iter()
        .map(|call| interp.eval_source(call).unwrap())
        .collect();
    assert_eq!(
        interp.eval_source(&format!("(compile {})", name)).unwrap(),
        Value::truth()
    );
    assert_compiled(&interp, name);
    for (call, expected) in calls.iter().zip(before) {
        let after = interp.eval_source(call).unwrap();
        assert_eq!(after, expected, "{} diverged after compiling {}", call, name);
    }
}

#[test]
fn square_compiles_transparently() {
    assert_transparent(
        "(defun square (x) (* x x))",
        "square",
        &["(square 5)", "(square -3)", "(square 0)"],
    );
}

#[test]
fn conditionals_compile_transparently() {
    assert_transparent(
        "(defun sign (x) (if (< x 0) -1 (if (> x 0) 1 0)))",
        "sign",
        &["(sign -9)", "(sign 4)", "(sign 0)"],
    );
}

#[test]
fn dotimes_compiles_transparently() {
    let defun = "(defun sum-to (n)
                   (progn
                     (set acc 0)
                     (dotimes (i n) (set acc (+ acc i)))
                     acc))";
    assert_transparent(defun, "sum-to", &["(sum-to 5)", "(sum-to 0)", "(sum-to 1)"]);
}

#[test]
fn dolist_compiles_transparently() {
    let defun = "(defun sum-list (xs)
                   (progn
                     (set total 0)
                     (dolist (e xs) (set total (+ total e)))
                     total))";
    assert_transparent(
        defun,
        "sum-list",
        &["(sum-list '(1 2 3))", "(sum-list nil)", "(sum-list '(10))"],
    );
}

#[test]
fn do_compiles_transparently() {
    let defun = "(defun count-down (n)
                   (progn
                     (set steps 0)
                     (do ((i n (- i 1))) (> i 0) (set steps (1+ steps)))
                     steps))";
    assert_transparent(defun, "count-down", &["(count-down 4)", "(count-down 0)"]);
}

#[test]
fn recursion_compiles_transparently() {
    assert_transparent(
        "(defun fib (n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))",
        "fib",
        &["(fib 0)", "(fib 1)", "(fib 10)"],
    );
}

#[test]
fn quote_compiles_transparently() {
    assert_transparent(
        "(defun tags (x) (quote (a b c)))",
        "tags",
        &["(tags 1)"],
    );
}

#[test]
fn push_inside_compiled_loop_updates_the_place() {
    let mut interp = interp_with("(defun fill-l (n) (dotimes (i n) (push i l)))");
    interp.eval_source("(compile fill-l)").unwrap();
    interp.eval_source("(fill-l 3)").unwrap();
    assert_eq!(interp.eval_source("l").unwrap().to_string(), "(2 1 0)");
}

#[test]
fn compiled_functions_keep_arity_checks() {
    let mut interp = interp_with("(defun square (x) (* x x))");
    interp.eval_source("(compile square)").unwrap();
    assert!(matches!(
        interp.eval_source("(square 1 2)").unwrap_err(),
        LanternError::Arity(_)
    ));
    assert!(matches!(
        interp.eval_source("(square)").unwrap_err(),
        LanternError::Arity(_)
    ));
}

#[test]
fn compiled_functions_keep_optional_parameters() {
    let mut interp = interp_with("(defun pad (x &optional y) (list x y))");
    interp.eval_source("(compile pad)").unwrap();
    assert_eq!(interp.eval_source("(pad 1)").unwrap().to_string(), "(1 NIL)");
    assert_eq!(interp.eval_source("(pad 1 2)").unwrap().to_string(), "(1 2)");
}

#[test]
fn compiled_functions_keep_call_time_defaults() {
    let mut interp = interp_with("(set base 10)");
    interp
        .eval_source("(defun bump (x &optional (y base)) (+ x y))")
        .unwrap();
    interp.eval_source("(compile bump)").unwrap();
    assert_eq!(interp.eval_source("(bump 1)").unwrap(), Value::Int(11));
    interp.eval_source("(set base 20)").unwrap();
    assert_eq!(interp.eval_source("(bump 1)").unwrap(), Value::Int(21));
}

#[test]
fn compiled_caller_sees_interpreted_callee_redefinition() {
    let mut interp = interp_with("(defun inner (x) (+ x 1))");
    interp.eval_source("(defun outer (x) (inner (inner x)))").unwrap();
    interp.eval_source("(compile outer)").unwrap();
    // First call binds OUTER's call-site cell to the interpreted INNER.
    assert_eq!(interp.eval_source("(outer 1)").unwrap(), Value::Int(3));
    // Redefining INNER bumps its version; the cached cell must not be
    // consulted again.
    interp.eval_source("(defun inner (x) (* x 10))").unwrap();
    assert_eq!(interp.eval_source("(outer 2)").unwrap(), Value::Int(200));
}

#[test]
fn compiled_caller_retargets_to_later_compiled_callee() {
    let mut interp = interp_with("(defun inner (x) (+ x 1))");
    interp.eval_source("(defun outer (x) (inner (inner x)))").unwrap();
    interp.eval_source("(compile outer)").unwrap();
    assert_eq!(interp.eval_source("(outer 1)").unwrap(), Value::Int(3));
    // Compiling the callee retargets the already-lowered caller
    // without re-lowering it.
    interp.eval_source("(compile inner)").unwrap();
    assert_compiled(&interp, "inner");
    assert_eq!(interp.eval_source("(outer 1)").unwrap(), Value::Int(3));
}

#[test]
fn callee_defined_after_caller_compiles_is_found() {
    let mut interp = interp_with("(defun caller (x) (helper x))");
    interp.eval_source("(compile caller)").unwrap();
    assert!(matches!(
        interp.eval_source("(caller 1)").unwrap_err(),
        LanternError::UnboundFunction(_)
    ));
    interp.eval_source("(defun helper (x) (* x 3))").unwrap();
    assert_eq!(interp.eval_source("(caller 2)").unwrap(), Value::Int(6));
}

#[test]
fn unsupported_construct_leaves_interpreted_function_usable() {
    let mut interp = interp_with("(defun with-let (x) (let ((y x)) y))");
    let err = interp.eval_source("(compile with-let)").unwrap_err();
    assert!(err.is_compile_error());
    assert!(matches!(
        interp.function("with-let"),
        Some(Function::Interpreted(_))
    ));
    assert_eq!(interp.eval_source("(with-let 7)").unwrap(), Value::Int(7));
}

#[test]
fn anonymous_lambda_compilation_returns_a_callable() {
    let mut interp = Interp::new();
    let value = interp
        .eval_source("(set triple (compile (lambda (x) (* x 3))))")
        .unwrap();
    assert!(matches!(value, Value::Function(_)));
    assert_eq!(interp.eval_source("(triple 7)").unwrap(), Value::Int(21));
}

#[test]
fn defun_cannot_redefine_a_compiled_function() {
    let mut interp = interp_with("(defun square (x) (* x x))");
    interp.eval_source("(compile square)").unwrap();
    let err = interp.eval_source("(defun square (x) x)").unwrap_err();
    assert!(matches!(err, LanternError::Message(_)));
    // The compiled definition is untouched.
    assert_eq!(interp.eval_source("(square 6)").unwrap(), Value::Int(36));
}

#[test]
fn compile_of_unknown_name_reports() {
    let mut interp = Interp::new();
    assert!(matches!(
        interp.eval_source("(compile missing)").unwrap_err(),
        LanternError::UnboundFunction(_)
    ));
}

#[test]
fn compile_twice_reports() {
    let mut interp = interp_with("(defun f (x) x)");
    interp.eval_source("(compile f)").unwrap();
    let err = interp.eval_source("(compile f)").unwrap_err();
    assert!(err.is_compile_error());
}

#[test]
fn compiled_loop_error_keeps_scope_balance() {
    let mut interp = interp_with("(defun boom (n) (dotimes (i n) (car i)))");
    interp.eval_source("(compile boom)").unwrap();
    assert!(interp.eval_source("(boom 1)").is_err());
    assert_eq!(interp.saved_depth(), 0);
    // Still usable afterwards.
    assert_eq!(interp.eval_source("(boom 0)").unwrap(), Value::Nil);
}

#[test]
fn compiled_parameters_stay_dynamically_visible() {
    let mut interp = interp_with("(defun peek () x)");
    interp.eval_source("(defun caller (x) (peek))").unwrap();
    interp.eval_source("(compile caller)").unwrap();
    assert_eq!(interp.eval_source("(caller 42)").unwrap(), Value::Int(42));
}

#[test]
fn compiled_loop_variable_is_visible_to_callees() {
    let mut interp = interp_with("(defun current-i () i)");
    interp
        .eval_source("(defun collect (n) (dotimes (i n) (push (current-i) seen)))")
        .unwrap();
    interp.eval_source("(compile collect)").unwrap();
    interp.eval_source("(collect 3)").unwrap();
    assert_eq!(interp.eval_source("seen").unwrap().to_string(), "(2 1 0)");
}

#[test]
fn nested_compiled_loops_keep_their_counters_apart() {
    let defun = "(defun grid (n)
                   (progn
                     (set cells nil)
                     (dotimes (i n)
                       (dotimes (j n)
                         (push (list i j) cells)))
                     cells))";
    assert_transparent(defun, "grid", &["(grid 2)"]);
}

#[test]
fn compiled_zero_count_loop_runs_zero_iterations() {
    let mut interp = interp_with("(defun touch (n) (dotimes (i n) (set hit t)))");
    interp.eval_source("(compile touch)").unwrap();
    interp.eval_source("(touch 0)").unwrap();
    interp.eval_source("(touch -2)").unwrap();
    assert_eq!(
        interp.eval_source("hit").unwrap(),
        Value::Symbol("HIT".into())
    );
}

#[test]
fn compile_transparency_for_set_and_free_symbols() {
    let defun = "(defun tally (n)
                   (progn
                     (set counter (+ counter n))
                     counter))";
    let mut interp = interp_with("(set counter 0)");
    interp.eval_source(defun).unwrap();
    assert_eq!(interp.eval_source("(tally 2)").unwrap(), Value::Int(2));
    interp.eval_source("(compile tally)").unwrap();
    assert_eq!(interp.eval_source("(tally 3)").unwrap(), Value::Int(5));
}
