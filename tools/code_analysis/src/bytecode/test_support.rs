//! Builds minimal class files and jars in memory for tests.

use byteorder::{BigEndian, WriteBytesExt};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

struct Member {
    access: u16,
    name: String,
    descriptor: String,
    deprecated: bool,
    exceptions: Vec<String>,
}

/// Writes a class file with the given members. Method bodies are omitted, which the JVM would
/// reject but the reader does not care about.
pub struct ClassBuilder {
    access: u16,
    name: String,
    super_class: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<Member>,
    methods: Vec<Member>,
    deprecated: bool,
    permitted: Vec<String>,
}

impl ClassBuilder {
    /// `name` is an internal name such as `com/example/Widget`.
    pub fn new(name: &str) -> ClassBuilder {
        ClassBuilder {
            access: super::classfile::access::PUBLIC,
            name: name.to_string(),
            super_class: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            deprecated: false,
            permitted: Vec::new(),
        }
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn super_class(mut self, name: &str) -> Self {
        self.super_class = Some(name.to_string());
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn permits(mut self, name: &str) -> Self {
        self.permitted.push(name.to_string());
        self
    }

    pub fn field(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.fields.push(member(access, name, descriptor, false, &[]));
        self
    }

    pub fn method(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.methods.push(member(access, name, descriptor, false, &[]));
        self
    }

    pub fn deprecated_method(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.methods.push(member(access, name, descriptor, true, &[]));
        self
    }

    pub fn throwing_method(mut self, access: u16, name: &str, descriptor: &str, exceptions: &[&str]) -> Self {
        self.methods.push(member(access, name, descriptor, false, exceptions));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut pool = Pool::default();
        let this_class = pool.class(&self.name);
        let super_class = self.super_class.as_deref().map(|s| pool.class(s)).unwrap_or(0);
        let interfaces: Vec<u16> = self.interfaces.iter().map(|i| pool.class(i)).collect();
        let fields: Vec<Vec<u8>> = self.fields.iter().map(|m| pool.member(m)).collect();
        let methods: Vec<Vec<u8>> = self.methods.iter().map(|m| pool.member(m)).collect();

        let mut attributes = Vec::new();
        let mut attribute_count = 0u16;
        if self.deprecated {
            attribute_count += 1;
            write_attribute(&mut attributes, pool.utf8("Deprecated"), &[]);
        }
        if !self.permitted.is_empty() {
            attribute_count += 1;
            let mut body = Vec::new();
            body.write_u16::<BigEndian>(self.permitted.len() as u16).unwrap();
            for p in &self.permitted {
                body.write_u16::<BigEndian>(pool.class(p)).unwrap();
            }
            write_attribute(&mut attributes, pool.utf8("PermittedSubclasses"), &body);
        }

        let mut out = Vec::new();
        out.write_u32::<BigEndian>(0xCAFE_BABE).unwrap();
        out.write_u16::<BigEndian>(0).unwrap();
        out.write_u16::<BigEndian>(61).unwrap();
        pool.write(&mut out);
        out.write_u16::<BigEndian>(self.access).unwrap();
        out.write_u16::<BigEndian>(this_class).unwrap();
        out.write_u16::<BigEndian>(super_class).unwrap();
        out.write_u16::<BigEndian>(interfaces.len() as u16).unwrap();
        for i in interfaces {
            out.write_u16::<BigEndian>(i).unwrap();
        }
        for table in [fields, methods] {
            out.write_u16::<BigEndian>(table.len() as u16).unwrap();
            for entry in table {
                out.extend(entry);
            }
        }
        out.write_u16::<BigEndian>(attribute_count).unwrap();
        out.extend(attributes);
        out
    }

    /// Internal name of the class, used as the jar entry path without `.class`.
    pub fn internal_name(&self) -> &str {
        &self.name
    }
}

fn member(access: u16, name: &str, descriptor: &str, deprecated: bool, exceptions: &[&str]) -> Member {
    Member {
        access,
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        deprecated,
        exceptions: exceptions.iter().map(|e| e.to_string()).collect(),
    }
}

fn write_attribute(out: &mut Vec<u8>, name: u16, body: &[u8]) {
    out.write_u16::<BigEndian>(name).unwrap();
    out.write_u32::<BigEndian>(body.len() as u32).unwrap();
    out.extend_from_slice(body);
}

#[derive(Default)]
struct Pool {
    entries: Vec<Vec<u8>>,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl Pool {
    fn push(&mut self, entry: Vec<u8>) -> u16 {
        self.entries.push(entry);
        self.entries.len() as u16
    }

    fn utf8(&mut self, text: &str) -> u16 {
        if let Some(&i) = self.utf8.get(text) {
            return i;
        }
        let encoded = cesu8::to_java_cesu8(text);
        let mut entry = vec![1];
        entry.write_u16::<BigEndian>(encoded.len() as u16).unwrap();
        entry.extend_from_slice(&encoded);
        let index = self.push(entry);
        self.utf8.insert(text.to_string(), index);
        index
    }

    fn class(&mut self, name: &str) -> u16 {
        if let Some(&i) = self.classes.get(name) {
            return i;
        }
        let name_index = self.utf8(name);
        let mut entry = vec![7];
        entry.write_u16::<BigEndian>(name_index).unwrap();
        let index = self.push(entry);
        self.classes.insert(name.to_string(), index);
        index
    }

    fn member(&mut self, m: &Member) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u16::<BigEndian>(m.access).unwrap();
        out.write_u16::<BigEndian>(self.utf8(&m.name)).unwrap();
        out.write_u16::<BigEndian>(self.utf8(&m.descriptor)).unwrap();
        let mut attributes = Vec::new();
        let mut count = 0u16;
        if m.deprecated {
            count += 1;
            write_attribute(&mut attributes, self.utf8("Deprecated"), &[]);
        }
        if !m.exceptions.is_empty() {
            count += 1;
            let mut body = Vec::new();
            body.write_u16::<BigEndian>(m.exceptions.len() as u16).unwrap();
            for e in &m.exceptions {
                body.write_u16::<BigEndian>(self.class(e)).unwrap();
            }
            write_attribute(&mut attributes, self.utf8("Exceptions"), &body);
        }
        out.write_u16::<BigEndian>(count).unwrap();
        out.extend(attributes);
        out
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.write_u16::<BigEndian>(self.entries.len() as u16 + 1).unwrap();
        for entry in &self.entries {
            out.extend_from_slice(entry);
        }
    }
}

/// Writes a jar at `path` holding the given classes.
pub fn write_jar(path: &Path, classes: Vec<ClassBuilder>) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    zip.start_file("META-INF/MANIFEST.MF", options).unwrap();
    zip.write_all(b"Manifest-Version: 1.0\n").unwrap();
    for class in classes {
        zip.start_file(format!("{}.class", class.internal_name()), options)
            .unwrap();
        zip.write_all(&class.build()).unwrap();
    }
    zip.finish().unwrap();
}
