use lantern_core::ast::Value;
use lantern_core::error::LanternError;
use lantern_core::eval::Interp;
use lantern_core::eval_source;

fn eval(src: &str) -> Result<Value, LanternError> {
    eval_source(src, None)
}

fn eval_str(src: &str) -> String {
    eval(src).unwrap().to_string()
}

#[test]
fn literals_evaluate_to_themselves() {
    assert_eq!(eval_str("42"), "42");
    assert_eq!(eval_str("-3"), "-3");
    assert_eq!(eval_str("2.5"), "2.5");
    assert_eq!(eval_str("\"hello\""), "\"hello\"");
}

#[test]
fn symbol_resolution() {
    assert_eq!(eval_str("t"), "T");
    assert_eq!(eval_str("nil"), "NIL");
    // An unbound symbol is a self-quoting literal.
    assert_eq!(eval_str("banana"), "BANANA");
    assert_eq!(eval_str("(progn (set x 9) x)"), "9");
}

#[test]
fn empty_list_is_nil() {
    assert_eq!(eval_str("()"), "NIL");
}

#[test]
fn if_evaluates_exactly_one_branch() {
    assert_eq!(eval_str("(if nil 1 2)"), "2");
    assert_eq!(eval_str("(if t 1 2)"), "1");
    assert_eq!(eval_str("(if 0 1 2)"), "1"); // any non-nil is true
    // The untaken branch must not run.
    assert_eq!(eval_str("(progn (if t 1 (set miss 1)) miss)"), "MISS");
    let err = eval("(if t 1)").unwrap_err();
    assert!(matches!(err, LanternError::Arity(_)));
}

#[test]
fn quote_returns_structure_unevaluated() {
    assert_eq!(eval_str("(quote (a b c))"), "(A B C)");
    assert_eq!(eval_str("'(1 (2 3))"), "(1 (2 3))");
    // No lookups happen on the quoted symbols.
    assert_eq!(eval_str("(progn (set a 1) '(a))"), "(A)");
}

#[test]
fn progn_returns_last() {
    assert_eq!(eval_str("(progn 1 2 3)"), "3");
    assert_eq!(eval_str("(progn)"), "NIL");
}

#[test]
fn let_creates_a_fresh_local_scope() {
    assert_eq!(eval_str("(let ((x 5)) (* x 2))"), "10");
    assert_eq!(eval_str("(let (x) x)"), "NIL");
    // The binding is gone after the body.
    assert_eq!(eval_str("(progn (let ((y 1)) y) y)"), "Y");
}

#[test]
fn let_initializers_run_before_any_binding_installs() {
    let src = "(progn (set x 1) (let ((x 10) (y x)) y))";
    assert_eq!(eval_str(src), "1");
}

#[test]
fn defun_and_call() {
    let mut interp = Interp::new();
    let name = interp.eval_source("(defun square (x) (* x x))").unwrap();
    assert_eq!(name, Value::Symbol("SQUARE".into()));
    assert_eq!(interp.eval_source("(square 5)").unwrap(), Value::Int(25));
}

#[test]
fn lambda_values_are_callable() {
    assert_eq!(eval_str("((lambda (x) (* x 2)) 21)"), "42");
    assert_eq!(
        eval_str("(progn (set double (lambda (x) (+ x x))) (double 4))"),
        "8"
    );
}

#[test]
fn arity_enforcement_with_optionals() {
    let mut interp = Interp::new();
    interp
        .eval_source("(defun f (a b &optional c) (list a b c))")
        .unwrap();
    assert!(matches!(
        interp.eval_source("(f 1)").unwrap_err(),
        LanternError::Arity(_)
    ));
    assert_eq!(interp.eval_source("(f 1 2)").unwrap().to_string(), "(1 2 NIL)");
    assert_eq!(interp.eval_source("(f 1 2 3)").unwrap().to_string(), "(1 2 3)");
    assert!(matches!(
        interp.eval_source("(f 1 2 3 4)").unwrap_err(),
        LanternError::Arity(_)
    ));
}

#[test]
fn optional_defaults_evaluate_at_call_time() {
    let mut interp = Interp::new();
    interp.eval_source("(set base 10)").unwrap();
    interp
        .eval_source("(defun bump (x &optional (y base)) (+ x y))")
        .unwrap();
    assert_eq!(interp.eval_source("(bump 1)").unwrap(), Value::Int(11));
    interp.eval_source("(set base 20)").unwrap();
    assert_eq!(interp.eval_source("(bump 1)").unwrap(), Value::Int(21));
    assert_eq!(interp.eval_source("(bump 1 5)").unwrap(), Value::Int(6));
}

#[test]
fn parameters_are_dynamically_scoped() {
    let src = "(progn
                 (defun peek () x)
                 (defun caller (x) (peek))
                 (caller 42))";
    assert_eq!(eval_str(src), "42");
}

#[test]
fn dotimes_counts_up_and_push_prepends() {
    let mut interp = Interp::new();
    interp.eval_source("(dotimes (i 3) (push i l))").unwrap();
    assert_eq!(interp.eval_source("l").unwrap().to_string(), "(2 1 0)");
}

#[test]
fn dotimes_with_non_positive_count_runs_zero_iterations() {
    assert_eq!(eval_str("(progn (dotimes (i 0) (set hit t)) hit)"), "HIT");
    assert_eq!(eval_str("(progn (dotimes (i -4) (set hit t)) hit)"), "HIT");
}

#[test]
fn dotimes_count_must_be_an_integer() {
    assert!(matches!(
        eval("(dotimes (i 2.5) i)").unwrap_err(),
        LanternError::Type { .. }
    ));
}

#[test]
fn dolist_walks_elements_in_order() {
    let src = "(progn
                 (set total 0)
                 (dolist (e '(1 2 3)) (set total (+ total e)))
                 total)";
    assert_eq!(eval_str(src), "6");
}

#[test]
fn dolist_loop_variable_does_not_leak() {
    assert_eq!(eval_str("(progn (dolist (e '(1 2)) e) e)"), "E");
}

#[test]
fn do_loops_until_predicate_goes_nil() {
    let src = "(progn
                 (set acc nil)
                 (do ((i 0 (1+ i))) (< i 3) (push i acc))
                 acc)";
    assert_eq!(eval_str(src), "(2 1 0)");
}

#[test]
fn cond_picks_the_first_truthy_clause() {
    assert_eq!(eval_str("(cond (nil 1) (t 2) (t 3))"), "2");
    assert_eq!(eval_str("(cond (nil 1))"), "NIL");
    // Without a result form the clause yields the test's value.
    assert_eq!(eval_str("(cond (nil) (7))"), "7");
}

#[test]
fn and_or_short_circuit() {
    assert_eq!(eval_str("(and 1 2 3)"), "3");
    assert_eq!(eval_str("(progn (and nil (set flag 1)) flag)"), "FLAG");
    assert_eq!(eval_str("(or nil 7 (set flag 1))"), "7");
    assert_eq!(eval_str("(or nil nil)"), "NIL");
    assert_eq!(eval_str("(and)"), "T");
}

#[test]
fn set_binds_globally_and_returns_the_value() {
    assert_eq!(eval_str("(set x (+ 1 2))"), "3");
    assert_eq!(eval_str("(progn (let ((x 1)) (set y 5)) y)"), "5");
}

#[test]
fn push_and_pop_update_a_place() {
    let mut interp = Interp::new();
    assert_eq!(interp.eval_source("(push 1 stack)").unwrap().to_string(), "(1)");
    assert_eq!(
        interp.eval_source("(push 2 stack)").unwrap().to_string(),
        "(2 1)"
    );
    assert_eq!(interp.eval_source("(pop stack)").unwrap(), Value::Int(2));
    assert_eq!(interp.eval_source("stack").unwrap().to_string(), "(1)");
    assert_eq!(interp.eval_source("(pop stack)").unwrap(), Value::Int(1));
    assert_eq!(interp.eval_source("(pop stack)").unwrap(), Value::Nil);
}

#[test]
fn arithmetic_contagion() {
    assert_eq!(eval_str("(+ 1 2 3)"), "6");
    assert_eq!(eval_str("(+ 1 2.0)"), "3.0");
    assert_eq!(eval_str("(- 10 1 2)"), "7");
    assert_eq!(eval_str("(- 5)"), "-5");
    assert_eq!(eval_str("(* 2 3 4)"), "24");
    assert_eq!(eval_str("(/ 20 2 2)"), "5");
    assert_eq!(eval_str("(/ 1 2.0)"), "0.5");
    assert_eq!(eval_str("(1+ 41)"), "42");
    assert_eq!(eval_str("(1- 43)"), "42");
}

#[test]
fn arithmetic_rejects_non_numbers() {
    assert!(matches!(
        eval("(+ 1 \"two\")").unwrap_err(),
        LanternError::Type { .. }
    ));
}

#[test]
fn comparison_chains() {
    assert_eq!(eval_str("(< 1 2 3)"), "T");
    assert_eq!(eval_str("(< 1 3 2)"), "NIL");
    assert_eq!(eval_str("(<= 1 1 2)"), "T");
    assert_eq!(eval_str("(> 3 2 1)"), "T");
    assert_eq!(eval_str("(= 2 2 2.0)"), "T");
    assert_eq!(eval_str("(/= 1 2 3)"), "T");
    assert_eq!(eval_str("(/= 1 2 1)"), "NIL");
}

#[test]
fn list_primitives() {
    assert_eq!(eval_str("(car '(1 2 3))"), "1");
    assert_eq!(eval_str("(cdr '(1 2 3))"), "(2 3)");
    assert_eq!(eval_str("(cdr '(1))"), "NIL");
    assert_eq!(eval_str("(car nil)"), "NIL");
    assert_eq!(eval_str("(cons 1 '(2 3))"), "(1 2 3)");
    assert_eq!(eval_str("(cons 1 nil)"), "(1)");
    assert_eq!(eval_str("(cons 1 2)"), "(1 2)");
    assert_eq!(eval_str("(list 1 (+ 1 1) 3)"), "(1 2 3)");
    assert_eq!(eval_str("(list)"), "NIL");
    assert_eq!(eval_str("(elt '(a b c) 1)"), "B");
    assert_eq!(eval_str("(elt \"abc\" 0)"), "\"a\"");
}

#[test]
fn predicates() {
    assert_eq!(eval_str("(atom 5)"), "T");
    assert_eq!(eval_str("(atom '(1))"), "NIL");
    assert_eq!(eval_str("(null nil)"), "T");
    assert_eq!(eval_str("(null 0)"), "NIL");
    assert_eq!(eval_str("(not nil)"), "T");
    assert_eq!(eval_str("(zerop 0)"), "T");
    assert_eq!(eval_str("(zerop 0.0)"), "T");
    assert_eq!(eval_str("(eq 'a 'a)"), "T");
    assert_eq!(eval_str("(eq '(1) '(1))"), "NIL");
    assert_eq!(eval_str("(equal '(1 (2)) '(1 (2)))"), "T");
}

#[test]
fn string_builtins() {
    assert_eq!(eval_str("(string 42)"), "\"42\"");
    assert_eq!(eval_str("(string-upcase \"abc\")"), "\"ABC\"");
    assert_eq!(eval_str("(string-downcase \"ABC\")"), "\"abc\"");
    assert_eq!(eval_str("(format nil \"x is ~A!\" 5)"), "\"x is 5!\"");
    assert_eq!(eval_str("(format nil \"~A~%~D\" 'a 2)"), "\"A\n2\"");
}

#[test]
fn min_max_mod_round() {
    assert_eq!(eval_str("(min 3 1 2)"), "1");
    assert_eq!(eval_str("(max 3 1 2.5)"), "3.0");
    assert_eq!(eval_str("(mod 7 3)"), "1");
    assert_eq!(eval_str("(round 7 2)"), "(4 -1)");
}

#[test]
fn unbound_function_reports() {
    assert!(matches!(
        eval("(frobnicate 1)").unwrap_err(),
        LanternError::UnboundFunction(_)
    ));
}

#[test]
fn calling_a_non_function_value_reports() {
    assert!(matches!(
        eval("(let ((f 5)) (f 1))").unwrap_err(),
        LanternError::Type { .. }
    ));
}

#[test]
fn scope_stack_balances_after_errors() {
    let mut interp = Interp::new();
    interp.eval_source("(defun bad (x) (car x))").unwrap();
    assert_eq!(interp.saved_depth(), 0);
    assert!(interp.eval_source("(bad 5)").is_err());
    assert_eq!(interp.saved_depth(), 0);
    assert!(interp.eval_source("(dotimes (i 3) (bad i))").is_err());
    assert_eq!(interp.saved_depth(), 0);
    assert!(interp.eval_source("(let ((x 1)) (bad x))").is_err());
    assert_eq!(interp.saved_depth(), 0);
}

#[test]
fn top_level_driver_recovers_per_form() {
    let mut interp = Interp::new();
    let forms = lantern_core::reader::read_all("(car 5) (set x 7) x").unwrap();
    let results: Vec<Value> = forms.iter().map(|f| interp.eval_top_level(f)).collect();
    assert_eq!(results[0], Value::Nil);
    assert_eq!(results[2], Value::Int(7));
    assert_eq!(interp.saved_depth(), 0);
}

#[test]
fn interpreted_functions_can_be_redefined() {
    let mut interp = Interp::new();
    interp.eval_source("(defun f (x) x)").unwrap();
    interp.eval_source("(defun f (x) (* x 2))").unwrap();
    assert_eq!(interp.eval_source("(f 4)").unwrap(), Value::Int(8));
}

#[test]
fn case_insensitive_names() {
    assert_eq!(eval_str("(CaR '(1 2))"), "1");
    let mut interp = Interp::new();
    interp.eval_source("(DEFUN Twice (X) (* x 2))").unwrap();
    assert_eq!(interp.eval_source("(twice 4)").unwrap(), Value::Int(8));
}

#[test]
fn quit_sets_the_interpreter_flag() {
    let mut interp = Interp::new();
    assert!(!interp.should_quit());
    interp.eval_source("(quit)").unwrap();
    assert!(interp.should_quit());
}
