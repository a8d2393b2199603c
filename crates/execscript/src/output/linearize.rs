//! Flattening nested groups into path-keyed store entries.
//!
//! A container variable `x` is written as one entry per element, labeled
//! with its `/`-joined path (`x/key/0`), a type tag under `{{type}}<path>`,
//! and a `;`-terminated manifest of every path under
//! `{{available-paths}}x`. Inside a label `/` is doubled and characters
//! above printable ASCII are tokenized. Children are written before their
//! container, so a container's path follows its descendants' paths.

use crate::escape::NonPrintableCodec;
use crate::tags::{Tag, TagGroup, TagValue};
use crate::traits::TagStore;

/// Label prefix of the path manifest of a variable.
pub const MANIFEST_PREFIX: &str = "{{available-paths}}";

/// Label prefix of the type tag of a path.
pub const TYPE_PREFIX: &str = "{{type}}";

/// Script routine storing a group linearized, with its manifest.
pub const LINEARIZE_FN: &str = "__exec_script_linearize_tags";

/// Script routine linearizing a group below a path; returns the paths.
pub const LINEARIZE_PATHS_FN: &str = "__exec_script_linearize_paths";

/// Script routine tokenizing non-printable characters.
pub const ESCAPE_FN: &str = "__exec_script_escape_nonprintable";

const HELPERS: &str = r#"// Helper routines for synchronizing results
string __exec_script_replace(string subject, string search, string replace){
    if(subject.find(search) < 0){
        return subject;
    }

    string r = "";
    number l = search.len();
    number pos;
    while((pos = subject.find(search)) >= 0){
        r.stringAppend(subject.left(pos) + replace);
        subject = subject.right(subject.len() - pos - l);
    }
    r.stringAppend(subject);

    return r;
}

string __exec_script_escape_nonprintable(string subject){
    string r = "";
    for(number i = 0; i < subject.len(); i++){
        string c = subject.mid(i, 1);
        number code = asc(c);
        if(code > 126 || (code == 123 && subject.mid(i, 5) == "{{unc")){
            r.stringAppend("{{unc" + code + "}}");
        }
        else{
            r.stringAppend(c);
        }
    }
    return r;
}

string __exec_script_linearize_paths(TagGroup linearized, TagGroup tg, string path){
    string available_paths = "";

    for(number i = 0; i < tg.TagGroupCountTags(); i++){
        string label;
        if(tg.TagGroupIsList()){
            label = i + "";
        }
        else{
            string key = tg.TagGroupGetTagLabel(i);
            if(key == ""){
                label = "{{unc}}";
            }
            else{
                label = __exec_script_replace(__exec_script_escape_nonprintable(key), ";", "{{unc59}}");
                string lead = "";
                if(label.left(1) == "/"){
                    lead = "{{unc47}}";
                    label = label.right(label.len() - 1);
                }
                label = lead + __exec_script_replace(label, "/", "//");
            }
        }
        number type = tg.TagGroupGetTagType(i, 0);
        string type_name = "";
        string p = path + "/" + label;
        number index;

        if(type == 0){
            TagGroup value;
            tg.TagGroupGetIndexedTagAsTagGroup(i, value);
            available_paths += __exec_script_linearize_paths(linearized, value, p);
            if(value.TagGroupIsList()){
                type_name = "TagList";
            }
            else{
                type_name = "TagGroup";
            }
        }
        else if(type == 2){
            number value;
            tg.TagGroupGetIndexedTagAsShort(i, value);
            index = linearized.TagGroupCreateNewLabeledTag(p);
            linearized.TagGroupSetIndexedTagAsShort(index, value);
            type_name = "Short";
        }
        else if(type == 3){
            number value;
            tg.TagGroupGetIndexedTagAsLong(i, value);
            index = linearized.TagGroupCreateNewLabeledTag(p);
            linearized.TagGroupSetIndexedTagAsLong(index, value);
            type_name = "Long";
        }
        else if(type == 4){
            number value;
            tg.TagGroupGetIndexedTagAsUInt16(i, value);
            index = linearized.TagGroupCreateNewLabeledTag(p);
            linearized.TagGroupSetIndexedTagAsUInt16(index, value);
            type_name = "UInt16";
        }
        else if(type == 5){
            number value;
            tg.TagGroupGetIndexedTagAsUInt32(i, value);
            index = linearized.TagGroupCreateNewLabeledTag(p);
            linearized.TagGroupSetIndexedTagAsUInt32(index, value);
            type_name = "UInt32";
        }
        else if(type == 6){
            number value;
            tg.TagGroupGetIndexedTagAsFloat(i, value);
            index = linearized.TagGroupCreateNewLabeledTag(p);
            linearized.TagGroupSetIndexedTagAsFloat(index, value);
            type_name = "Float";
        }
        else if(type == 7){
            number value;
            tg.TagGroupGetIndexedTagAsDouble(i, value);
            index = linearized.TagGroupCreateNewLabeledTag(p);
            linearized.TagGroupSetIndexedTagAsDouble(index, value);
            type_name = "Double";
        }
        else if(type == 8){
            number value;
            tg.TagGroupGetIndexedTagAsBoolean(i, value);
            index = linearized.TagGroupCreateNewLabeledTag(p);
            linearized.TagGroupSetIndexedTagAsBoolean(index, value);
            type_name = "Boolean";
        }
        // type 15 (points, rects, complex numbers) is not synchronized
        else if(type == 20){
            string value;
            tg.TagGroupGetIndexedTagAsString(i, value);
            index = linearized.TagGroupCreateNewLabeledTag(p);
            linearized.TagGroupSetIndexedTagAsString(index, __exec_script_escape_nonprintable(value));
            type_name = "String";
        }

        if(type_name != ""){
            index = linearized.TagGroupCreateNewLabeledTag("{{type}}" + p);
            linearized.TagGroupSetIndexedTagAsString(index, type_name);
            available_paths += p + ";";
        }
    }

    return available_paths;
}

void __exec_script_linearize_tags(TagGroup linearized, TagGroup tg, string var_name){
    string available_paths = __exec_script_linearize_paths(linearized, tg, var_name);
    linearized.TagGroupSetTagAsString("{{available-paths}}" + var_name, available_paths);
}"#;

/// Definitions of the replace, escape and linearize routines.
pub fn helper_functions() -> &'static str {
    HELPERS
}

/// Path label standing for an empty map key.
pub const EMPTY_LABEL: &str = "{{unc}}";

/// Escape one map key for use as a path label.
///
/// Besides the codec's tokens, `;` (the manifest separator) and a leading
/// `/` are tokenized and the remaining slashes doubled, so a label never
/// starts with `/` and never contains `;`. The empty key is [`EMPTY_LABEL`],
/// which the codec can neither produce nor decode.
pub fn escape_label(key: &str, codec: &NonPrintableCodec) -> String {
    let escaped = codec.escape(key);
    if escaped.is_empty() {
        return EMPTY_LABEL.to_string();
    }
    let (lead, rest) = match escaped.strip_prefix('/') {
        Some(rest) => ("{{unc47}}", rest),
        None => ("", escaped.as_str()),
    };
    format!("{lead}{}", rest.replace(';', "{{unc59}}").replace('/', "//"))
}

/// Map key for a path label with doubled slashes already collapsed.
pub fn unescape_label(label: &str, codec: &NonPrintableCodec) -> String {
    if label == EMPTY_LABEL {
        return String::new();
    }
    codec.unescape(label)
}

/// Write `group` linearized under `namespace`, as the script routine does.
///
/// In-memory hosts call this to play the script's part. Returns the manifest.
pub fn linearize_into(
    store: &mut (impl TagStore + ?Sized),
    namespace: &str,
    var: &str,
    group: &TagGroup,
    codec: &NonPrintableCodec,
) -> String {
    let mut manifest = String::new();
    linearize_group(store, namespace, group, var, codec, &mut manifest);
    store.set_as_string(&format!("{namespace}:{MANIFEST_PREFIX}{var}"), &manifest);
    tracing::debug!(namespace, var, entries = manifest.matches(';').count(), "linearized group");
    manifest
}

fn linearize_group(
    store: &mut (impl TagStore + ?Sized),
    namespace: &str,
    group: &TagGroup,
    path: &str,
    codec: &NonPrintableCodec,
    manifest: &mut String,
) {
    for (i, entry) in group.entries().iter().enumerate() {
        let label = if group.is_list() {
            i.to_string()
        } else {
            escape_label(&entry.label, codec)
        };
        let p = format!("{path}/{label}");
        match &entry.tag {
            Tag::Group(child) => linearize_group(store, namespace, child, &p, codec, manifest),
            Tag::Value(TagValue::String(s)) => {
                store.set_as_string(&format!("{namespace}:{p}"), &codec.escape(s));
            }
            Tag::Value(v) => store.set_tag(&format!("{namespace}:{p}"), Tag::Value(v.clone())),
        }
        store.set_as_string(&format!("{namespace}:{TYPE_PREFIX}{p}"), entry.tag.type_name());
        manifest.push_str(&p);
        manifest.push(';');
    }
}
