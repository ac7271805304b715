//! Renders the descriptors `cafebabe` decodes (JVMS §4.3) as Java source type names, and back in
//! their JVM form for comparing members across versions.

use cafebabe::descriptors::{FieldDescriptor, FieldType, MethodDescriptor, ReturnDescriptor};

/// `java/util/Map$Entry` becomes `java.util.Map.Entry`.
pub fn internal_to_java(internal: &str) -> String {
    internal.replace(['/', '$'], ".")
}

/// Java name and descriptor letter(s) of a non-array type.
fn base_type(field_type: &FieldType) -> (String, String) {
    let (java, jvm) = match field_type {
        FieldType::Byte => ("byte", "B"),
        FieldType::Char => ("char", "C"),
        FieldType::Double => ("double", "D"),
        FieldType::Float => ("float", "F"),
        FieldType::Integer => ("int", "I"),
        FieldType::Long => ("long", "J"),
        FieldType::Short => ("short", "S"),
        FieldType::Boolean => ("boolean", "Z"),
        FieldType::Object(class) => {
            let internal = class.to_string();
            return (internal_to_java(&internal), format!("L{internal};"));
        }
    };
    (java.to_string(), jvm.to_string())
}

/// The Java type a field descriptor names, e.g. `java.lang.String` or `int[][]`.
pub fn java_type(descriptor: &FieldDescriptor) -> String {
    let (java, _) = base_type(&descriptor.field_type);
    format!("{java}{}", "[]".repeat(descriptor.dimensions as usize))
}

pub fn java_result(result: &ReturnDescriptor) -> String {
    match result {
        ReturnDescriptor::Void => "void".to_string(),
        ReturnDescriptor::Return(descriptor) => java_type(descriptor),
    }
}

/// JVM form of a field descriptor: `[Ljava/lang/String;`.
pub fn field_descriptor(descriptor: &FieldDescriptor) -> String {
    let (_, jvm) = base_type(&descriptor.field_type);
    format!("{}{jvm}", "[".repeat(descriptor.dimensions as usize))
}

/// JVM form of a method descriptor: `(I[Ljava/lang/Object;)V`.
pub fn method_descriptor(descriptor: &MethodDescriptor) -> String {
    let parameters: String = descriptor.parameters.iter().map(field_descriptor).collect();
    let result = match &descriptor.return_type {
        ReturnDescriptor::Void => "V".to_string(),
        ReturnDescriptor::Return(d) => field_descriptor(d),
    };
    format!("({parameters}){result}")
}
