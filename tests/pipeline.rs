use g9cc::generate_assembly;

fn compile(source: &str) -> String {
  generate_assembly(source).unwrap_or_else(|err| panic!("{}", err.render(source)))
}

#[test]
fn output_begins_with_intel_syntax_and_main() {
  let asm = compile("return 0;");
  let mut lines = asm.lines();
  assert_eq!(lines.next(), Some(".intel_syntax noprefix"));
  assert_eq!(lines.next(), Some("\t.global main"));
  assert_eq!(lines.next(), Some("main:"));
}

#[test]
fn each_function_gets_a_global_label() {
  let asm = compile("one() { return 1; } two() { return 2; } main() { return one() + two(); }");
  for name in ["one", "two", "main"] {
    assert!(asm.contains(&format!("\t.global {name}\n{name}:\n")), "missing {name}");
  }
  assert!(asm.contains("\tjmp .L.return.one\n"));
}

#[test]
fn whitespace_and_newlines_separate_tokens() {
  assert_eq!(compile("a = 3;\n\treturn a;"), compile("a=3; return a;"));
}

#[test]
fn sibling_ifs_use_distinct_labels() {
  let asm = compile("if (1) a=1; if (2) a=2; return a;");
  assert!(asm.contains(".L.else.1:"));
  assert!(asm.contains(".L.else.2:"));
  assert!(asm.contains(".L.end.1:"));
  assert!(asm.contains(".L.end.2:"));
}

#[test]
fn fresh_compilations_restart_label_ids() {
  let first = compile("if (1) return 1; return 0;");
  let second = compile("if (1) return 1; return 0;");
  assert_eq!(first, second);
  assert!(second.contains(".L.else.1:"));
}

#[test]
fn empty_input_is_an_empty_main() {
  let asm = compile("");
  assert!(asm.contains("main:\n\tpush rbp\n\tmov rbp, rsp\n\tmov rax, 0\n"));
}

#[test]
fn for_without_condition_never_tests() {
  let asm = compile("for (;;) return 3;");
  assert!(!asm.contains("\tcmp rax, 0\n"));
  assert!(asm.contains("\tjmp .L.begin.1\n"));
}

#[test]
fn division_sign_extends_the_dividend() {
  let asm = compile("return 7/2;");
  assert!(asm.contains("\tcqo\n\tidiv rdi\n"));
}
