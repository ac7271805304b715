//! Reading compiled dependencies: class files, descriptors and jar class paths.

pub mod classfile;
pub mod descriptor;
pub mod jar;
#[cfg(any(test, feature = "test-util"))]
pub mod test_support;

pub use classfile::{ClassFile, FieldInfo, MethodInfo, Visibility};
pub use jar::ClassPath;
