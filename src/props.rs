//! Вложенные свойства поверх `serde_json::Value` и мелкие парсеры.
//!
//! Путь к свойству - ключи через точку: `"node.cpu.count"`.

use super::errors::{Error, Result};
use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use serde::Serialize;
use serde_json::{
    ser::{PrettyFormatter, Serializer},
    Map, Value,
};
use tracing::debug;


fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn missing(path: &str) -> Error {
    Error::InvalidProperty(format!("{:?} does not exist", path))
}

/// Значение по пути или `InvalidProperty`
pub fn get_prop<'a>(root: &'a Value, path: &str) -> Result<&'a Value> {
    path.split('.')
        .try_fold(root, |item, key| item.as_object()?.get(key))
        .ok_or_else(|| missing(path))
}

/// Находит объект-родитель последнего ключа.
/// Без `verify` недостающие промежуточные объекты создаются
fn parent_mut<'a, 'p>(
    root: &'a mut Value,
    path: &'p str,
    verify: bool,
) -> Result<(&'a mut Map<String, Value>, &'p str)> {
    let mut keys: Vec<&str> = path.split('.').collect();
    let last = keys.pop().ok_or_else(|| missing(path))?;

    let mut item = root;
    for key in keys {
        let object = item.as_object_mut().ok_or_else(|| missing(path))?;
        if verify && !object.contains_key(key) {
            return Err(missing(path));
        }
        item = object
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let object = item.as_object_mut().ok_or_else(|| missing(path))?;
    Ok((object, last))
}

/// Записывает значение и возвращает старое.
/// С `verify` свойство обязано существовать и иметь тот же тип
pub fn set_prop(root: &mut Value, path: &str, value: Value, verify: bool) -> Result<Option<Value>> {
    set_prop_with_schema(root, path, value, verify, None)
}

/// Как `set_prop`, но с `verify` отсутствующее в данных свойство можно
/// записать, если оно объявлено в `schema`. Тип при этом не сверяется
pub fn set_prop_with_schema(
    root: &mut Value,
    path: &str,
    value: Value,
    verify: bool,
    schema: Option<&Value>,
) -> Result<Option<Value>> {
    let (object, key) = parent_mut(root, path, verify)?;

    if verify {
        match (object.get(key), schema) {
            (Some(old), _) if json_type(old) != json_type(&value) => {
                return Err(Error::InvalidProperty(format!(
                    "{:?} type is {:?}, got {:?}: {}",
                    path,
                    json_type(old),
                    json_type(&value),
                    value
                )));
            }
            (Some(_), _) => {}
            (None, Some(schema)) => {
                get_prop(schema, path)?;
            }
            (None, None) => return Err(missing(path)),
        }
    }

    Ok(object.insert(key.to_string(), value))
}

/// Плоский список `(путь, значение)` по всем листьям, в порядке ключей
pub fn path_iter(value: &Value) -> Vec<(String, &Value)> {
    fn walk<'a>(value: &'a Value, prefix: &mut Vec<String>, out: &mut Vec<(String, &'a Value)>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    prefix.push(key.clone());
                    walk(child, prefix, out);
                    prefix.pop();
                }
            }
            leaf => out.push((prefix.join("."), leaf)),
        }
    }

    let mut out = Vec::new();
    if let Value::Object(_) = value {
        walk(value, &mut Vec::new(), &mut out);
    }
    out
}


/// Пишет JSON во временный файл рядом и переименовывает поверх `file_path`,
/// так что целевой файл никогда не виден наполовину записанным
pub fn json_dump(data: &Value, file_path: &Path) -> Result<()> {
    let mut temp_name = file_path.as_os_str().to_owned();
    temp_name.push(".json_dump.tmp");
    let temp_path = PathBuf::from(temp_name);

    {
        let mut out = BufWriter::new(fs::File::create(&temp_path)?);
        let mut ser = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
        data.serialize(&mut ser)?;
        out.write_all(b"\n")?;
        out.flush()?;
    }

    fs::rename(&temp_path, file_path)?;
    debug!(path = %file_path.display(), "json written");
    Ok(())
}


/// Число файлов и суммарный размер в байтах по всему дереву каталога
#[derive(Debug, Clone, Serialize)]
pub struct DirStats {
    pub path: PathBuf,
    pub file_count: u64,
    pub total_bytes: u64,
}

pub fn dir_stats(dir_path: impl AsRef<Path>) -> Result<DirStats> {
    let path = dir_path.as_ref().to_path_buf();
    let mut stats = DirStats {
        path: path.clone(),
        file_count: 0,
        total_bytes: 0,
    };

    let mut dirs = vec![path];
    while let Some(dir) = dirs.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                dirs.push(entry.path());
                continue;
            }
            // Симлинки на каталоги не обходим и не считаем
            let meta = fs::metadata(entry.path())?;
            if !meta.is_dir() {
                stats.file_count += 1;
                stats.total_bytes += meta.len();
            }
        }
    }
    Ok(stats)
}


/// Хранилище свойств в JSON-файле
pub struct PropStore {
    path: PathBuf,
    data: Value,
}

impl PropStore {
    /// Отсутствующий файл - пустой набор свойств
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Value::Object(Map::new()),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, data })
    }

    pub fn get(&self, path: &str) -> Result<&Value> {
        get_prop(&self.data, path)
    }

    pub fn set(&mut self, path: &str, value: Value, verify: bool) -> Result<Option<Value>> {
        set_prop(&mut self.data, path, value, verify)
    }

    pub fn save(&self) -> Result<()> {
        json_dump(&self.data, &self.path)
    }

    pub fn iter(&self) -> Vec<(String, &Value)> {
        path_iter(&self.data)
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}


fn convert(conv: &str, raw: &str) -> std::result::Result<Value, String> {
    match conv {
        "str" => Ok(Value::String(raw.to_string())),
        "int" => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| format!("invalid int {:?}: {}", raw, e)),
        "float" => raw
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .map_err(|e| format!("invalid float {:?}: {}", raw, e)),
        "bool" => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Value::Bool(true)),
            "0" | "false" | "no" | "off" => Ok(Value::Bool(false)),
            other => Err(format!("invalid bool {:?}", other)),
        },
        "json" => serde_json::from_str(raw).map_err(|e| format!("invalid json {:?}: {}", raw, e)),
        other => Err(format!("unknown converter {:?}", other)),
    }
}

/// Разбирает `"имя[:конвертер]=значение"` в `(имя, значение)`.
///
/// `"foo=hello"` -> `("foo", "hello")`, `"bar:int=123"` -> `("bar", 123)`,
/// без `=` значение - `null`.
pub fn parse_prop(prop_str: &str) -> Result<(String, Value)> {
    let (name, raw) = match prop_str.split_once('=') {
        Some((name, raw)) => (name, Some(raw)),
        None => (prop_str, None),
    };

    let (name, conv) = match name.split_once(':') {
        Some((name, conv)) => (name, conv),
        None => (name, "str"),
    };

    let value = match raw {
        Some(raw) => convert(conv, raw).map_err(Error::InvalidProperty)?,
        None => Value::Null,
    };

    Ok((name.to_string(), value))
}

/// `"N"` -> `(1, N + 1)`, `"N..M"` -> `(N, M + 1)`: полуоткрытый диапазон
pub fn parse_count(count_str: &str) -> Result<(i64, i64)> {
    let invalid = || Error::InvalidRange(format!("invalid range: {:?}", count_str));
    let parse = |s: &str| s.parse::<i64>().map_err(|_| invalid());

    let parts: Vec<&str> = count_str.split("..").collect();
    match parts.as_slice() {
        [count] => Ok((1, parse(*count)? + 1)),
        [start, end] => Ok((parse(*start)?, parse(*end)? + 1)),
        _ => Err(invalid()),
    }
}
