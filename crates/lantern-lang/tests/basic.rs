use lantern_core::eval::Interp;
use lantern_core::eval_source;

fn eval_str(src: &str) -> String {
    eval_source(src, None).unwrap().to_string()
}

#[test]
fn arithmetic_session() {
    assert_eq!(eval_str("(+ 1 2 3)"), "6");
    assert_eq!(eval_str("(* 2 (+ 3 4))"), "14");
    assert_eq!(eval_str("(sqrt 9)"), "3.0");
}

#[test]
fn definitions_persist_across_forms() {
    let src = "(defun area (w &optional (h w)) (* w h))
               (list (area 3) (area 3 4))";
    assert_eq!(eval_str(src), "(9 12)");
}

#[test]
fn script_with_comments_and_quotes() {
    let src = "; build a list and take it apart
               (set xs '(10 20 30))
               (list (car xs) (cdr xs))";
    assert_eq!(eval_str(src), "(10 (20 30))");
}

#[test]
fn compile_session_keeps_results() {
    let mut interp = Interp::new();
    interp.eval_source("(defun square (x) (* x x))").unwrap();
    assert_eq!(interp.eval_source("(square 5)").unwrap().to_string(), "25");
    interp.eval_source("(compile square)").unwrap();
    assert_eq!(interp.eval_source("(square 5)").unwrap().to_string(), "25");
}

#[test]
fn failing_form_yields_nil_and_the_session_continues() {
    let mut interp = Interp::new();
    let forms = lantern_core::reader::read_all("(car 1) (+ 1 1)").unwrap();
    let first = interp.eval_top_level(&forms[0]);
    let second = interp.eval_top_level(&forms[1]);
    assert_eq!(first.to_string(), "NIL");
    assert_eq!(second.to_string(), "2");
}
