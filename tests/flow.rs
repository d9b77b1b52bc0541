//! 端到端图构建测试：用 ProgramBuilder 构造内核程序，经 CompileUnit 构建并校验

#[path = "flow/support.rs"]
mod support;

#[path = "flow/closures.rs"]
mod closures;
#[path = "flow/control_flow.rs"]
mod control_flow;
#[path = "flow/driver.rs"]
mod driver;
#[path = "flow/exceptions.rs"]
mod exceptions;
#[path = "flow/members.rs"]
mod members;
