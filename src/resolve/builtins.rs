//! Well-known identifiers per language. References to these are dropped
//! before any resolution strategy runs. The lists are intentionally
//! hard-coded and non-exhaustive.

const JS_GLOBALS: &[&str] = &[
    "console", "window", "document", "globalThis", "Math", "JSON", "Object", "Array",
    "String", "Number", "Boolean", "Promise", "Map", "Set", "WeakMap", "WeakSet",
    "Symbol", "Date", "RegExp", "Error", "TypeError", "RangeError", "SyntaxError",
    "parseInt", "parseFloat", "isNaN", "isFinite", "setTimeout", "setInterval",
    "clearTimeout", "clearInterval", "queueMicrotask", "structuredClone", "fetch",
    "alert", "prompt", "confirm", "require", "module", "exports", "process",
    "Buffer", "URL", "URLSearchParams", "TextEncoder", "TextDecoder", "Intl",
    "Reflect", "Proxy", "BigInt", "Infinity", "NaN", "undefined", "atob", "btoa",
    "encodeURIComponent", "decodeURIComponent", "encodeURI", "decodeURI",
    "localStorage", "sessionStorage", "navigator", "history", "location",
    "addEventListener", "removeEventListener", "dispatchEvent", "Int8Array",
    "Uint8Array", "Float32Array", "Float64Array", "ArrayBuffer", "DataView",
];

const REACT_HOOKS: &[&str] = &[
    "useState", "useEffect", "useContext", "useReducer", "useCallback", "useMemo",
    "useRef", "useImperativeHandle", "useLayoutEffect", "useDebugValue",
    "useDeferredValue", "useTransition", "useId", "useSyncExternalStore",
    "useInsertionEffect", "useOptimistic", "useActionState",
];

const PY_BUILTINS: &[&str] = &[
    "print", "len", "range", "str", "int", "float", "bool", "list", "dict", "set",
    "tuple", "type", "isinstance", "issubclass", "super", "object", "enumerate",
    "zip", "map", "filter", "sorted", "reversed", "sum", "min", "max", "abs",
    "round", "open", "input", "repr", "hash", "id", "iter", "next", "getattr",
    "setattr", "hasattr", "delattr", "vars", "dir", "callable", "format", "any",
    "all", "divmod", "pow", "bin", "hex", "oct", "ord", "chr", "bytes",
    "bytearray", "memoryview", "frozenset", "complex", "slice", "staticmethod",
    "classmethod", "property", "globals", "locals", "exec", "eval", "compile",
    "Exception", "ValueError", "TypeError", "KeyError", "IndexError",
    "AttributeError", "RuntimeError", "StopIteration", "NotImplementedError",
    "FileNotFoundError", "OSError", "ZeroDivisionError",
];

const PASCAL_RTL_UNITS: &[&str] = &[
    "System", "SysUtils", "Classes", "Math", "StrUtils", "DateUtils", "Variants",
    "TypInfo", "RTLConsts", "IOUtils", "Generics.Collections", "Generics.Defaults",
    "Windows", "Messages", "Forms", "Dialogs", "Graphics", "Controls", "StdCtrls",
    "ExtCtrls", "Registry", "IniFiles",
];

const RUST_PRELUDE: &[&str] = &[
    "println", "print", "eprintln", "eprint", "format", "vec", "panic", "assert",
    "assert_eq", "assert_ne", "debug_assert", "todo", "unimplemented",
    "unreachable", "matches", "write", "writeln", "dbg", "include_str",
    "include_bytes", "env", "concat", "stringify", "Some", "None", "Ok", "Err",
    "String", "Vec", "Box", "Rc", "Arc", "Option", "Result", "drop", "Default",
    "Clone", "Copy", "Debug", "PartialEq", "Eq", "Hash", "From", "Into",
    "Iterator", "ToString",
];

/// Whether a reference name is a well-known builtin of its language and
/// should be filtered rather than resolved.
pub fn is_builtin(language: &str, name: &str) -> bool {
    match language {
        "javascript" | "typescript" | "tsx" | "svelte" => {
            JS_GLOBALS.contains(&name) || REACT_HOOKS.contains(&name)
        }
        "python" => PY_BUILTINS.contains(&name),
        "pascal" | "delphi" => PASCAL_RTL_UNITS.contains(&name),
        "rust" => RUST_PRELUDE.contains(&name),
        _ => false,
    }
}
