use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::response::ResponseContainer;

/// Resolves a tester path to a JSON path into the response.
fn resolve_path(path: &str) -> String {
    let path = path.trim();
    if path.is_empty() {
        "$.data".to_string()
    } else if path.starts_with('$') {
        path.to_string()
    } else if path.starts_with("data.") {
        format!("$.{path}")
    } else {
        format!("$.data.{path}")
    }
}

/// Whether `path` may select more than one value.
fn is_indefinite(path: &str) -> bool {
    path.contains("[*]") || path.contains("..") || path.contains("?(") || path.contains(':')
}

/// Verifies the value found at a path of the response.
#[derive(Clone)]
pub struct PathSpec {
    container: Arc<ResponseContainer>,
    path: String,
    indefinite: bool,
}

impl PathSpec {
    pub(super) fn new(container: Arc<ResponseContainer>, path: &str) -> Self {
        let path = resolve_path(path);
        let indefinite = is_indefinite(&path);
        Self {
            container,
            path,
            indefinite,
        }
    }

    /// Switches to another path of the same response.
    pub fn path(&self, path: &str) -> PathSpec {
        PathSpec::new(self.container.clone(), path)
    }

    /// The value at the path: `None` if a definite path selects nothing, all
    /// the matches as an array for an indefinite path.
    fn select(&self) -> Option<Value> {
        let found = match jsonpath_lib::select(self.container.json(), &self.path) {
            Ok(found) => found,
            Err(error) => self
                .container
                .fail(format!("Invalid JSON path \"{}\": {error:?}", self.path)),
        };
        if self.indefinite {
            Some(Value::Array(found.into_iter().cloned().collect()))
        } else {
            found.first().map(|value| (*value).clone())
        }
    }

    /// Some value, possibly `null`, is present at the path.
    fn present(&self) -> Option<Value> {
        match self.select() {
            Some(Value::Array(matches)) if self.indefinite && matches.is_empty() => None,
            found => found,
        }
    }

    pub fn path_exists(&self) -> &Self {
        if self.present().is_none() {
            self.container
                .fail(format!("No value at JSON path \"{}\"", self.path))
        }
        self
    }

    pub fn path_does_not_exist(&self) -> &Self {
        if let Some(value) = self.present() {
            self.container.fail(format!(
                "Expected no value at JSON path \"{}\" but found: {value}",
                self.path
            ))
        }
        self
    }

    /// A non-null value is present at the path.
    pub fn value_exists(&self) -> &Self {
        self.existing_value();
        self
    }

    pub fn value_does_not_exist(&self) -> &Self {
        match self.present() {
            None | Some(Value::Null) => {}
            Some(value) => self.container.fail(format!(
                "Expected no value at JSON path \"{}\" but found: {value}",
                self.path
            )),
        }
        self
    }

    /// The value is absent, `null`, or an empty string, array or object.
    pub fn value_is_empty(&self) -> &Self {
        if let Some(value) = self.select() {
            if !is_empty(&value) {
                self.container.fail(format!(
                    "Expected an empty value at JSON path \"{}\" but found: {value}",
                    self.path
                ))
            }
        }
        self
    }

    pub fn value_is_not_empty(&self) -> &Self {
        let value = self.existing_value();
        if is_empty(&value) {
            self.container.fail(format!(
                "Expected a non-empty value at JSON path \"{}\" but found: {value}",
                self.path
            ))
        }
        self
    }

    /// Compares the value with `expected` JSON, allowing extra fields and any
    /// array order.
    pub fn matches_json(&self, expected: &str) -> &Self {
        self.compare_json(expected, false)
    }

    /// Compares the value with `expected` JSON exactly.
    pub fn matches_json_strictly(&self, expected: &str) -> &Self {
        self.compare_json(expected, true)
    }

    fn compare_json(&self, expected: &str, strict: bool) -> &Self {
        let expected: Value = match serde_json::from_str(expected) {
            Ok(expected) => expected,
            Err(error) => self
                .container
                .fail(format!("Expected content is not valid JSON: {error}")),
        };
        let actual = self.select().unwrap_or(Value::Null);
        let matched = if strict {
            json_eq(&expected, &actual)
        } else {
            lenient_match(&expected, &actual)
        };
        if !matched {
            self.container.fail(format!(
                "JSON at path \"{}\" does not match.\nExpected: {expected}\nActual: {actual}",
                self.path
            ))
        }
        self
    }

    /// Converts the value to `T`.
    pub fn entity<T: DeserializeOwned>(&self) -> EntitySpec<T> {
        let value = self.existing_value();
        EntitySpec {
            entity: self.convert(value),
            path: self.clone(),
        }
    }

    /// Converts the value, an array, to a list of `T`.
    pub fn entity_list<T: DeserializeOwned>(&self) -> EntityListSpec<T> {
        let entities = match self.existing_value() {
            Value::Array(values) => values,
            other => self.container.fail(format!(
                "Expected a list at JSON path \"{}\" but found: {other}",
                self.path
            )),
        };
        EntityListSpec {
            entities: self.convert(Value::Array(entities)),
            path: self.clone(),
        }
    }

    fn existing_value(&self) -> Value {
        match self.present() {
            None | Some(Value::Null) => self
                .container
                .fail(format!("No value at JSON path \"{}\"", self.path)),
            Some(value) => value,
        }
    }

    fn convert<T: DeserializeOwned>(&self, value: Value) -> T {
        match serde_json::from_value(value) {
            Ok(entity) => entity,
            Err(error) => self.container.fail(format!(
                "Cannot convert the value at JSON path \"{}\" to {}: {error}",
                self.path,
                std::any::type_name::<T>()
            )),
        }
    }
}

impl fmt::Debug for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathSpec").field("path", &self.path).finish()
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(string) => string.is_empty(),
        Value::Array(array) => array.is_empty(),
        Value::Object(object) => object.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn json_eq(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(expected), Value::Number(actual)) => expected.as_f64() == actual.as_f64(),
        (Value::Array(expected), Value::Array(actual)) => {
            expected.len() == actual.len()
                && expected
                    .iter()
                    .zip(actual)
                    .all(|(expected, actual)| json_eq(expected, actual))
        }
        (Value::Object(expected), Value::Object(actual)) => {
            expected.len() == actual.len()
                && expected.iter().all(|(key, expected)| {
                    actual
                        .get(key)
                        .is_some_and(|actual| json_eq(expected, actual))
                })
        }
        (expected, actual) => expected == actual,
    }
}

/// Objects may have extra fields; arrays have the same length, in any order.
fn lenient_match(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(expected), Value::Number(actual)) => expected.as_f64() == actual.as_f64(),
        (Value::Object(expected), Value::Object(actual)) => expected.iter().all(|(key, expected)| {
            actual
                .get(key)
                .is_some_and(|actual| lenient_match(expected, actual))
        }),
        (Value::Array(expected), Value::Array(actual)) => {
            expected.len() == actual.len()
                && match_unordered(expected, actual, &mut vec![false; actual.len()])
        }
        (expected, actual) => expected == actual,
    }
}

fn match_unordered(expected: &[Value], actual: &[Value], used: &mut Vec<bool>) -> bool {
    let Some((first, rest)) = expected.split_first() else {
        return true;
    };
    for (index, candidate) in actual.iter().enumerate() {
        if used[index] || !lenient_match(first, candidate) {
            continue;
        }
        used[index] = true;
        if match_unordered(rest, actual, used) {
            return true;
        }
        used[index] = false;
    }
    false
}

/// Verifies a value converted from the response.
pub struct EntitySpec<T> {
    entity: T,
    path: PathSpec,
}

impl<T: fmt::Debug> EntitySpec<T> {
    pub fn is_equal_to<E: fmt::Debug>(self, expected: E) -> Self
    where
        T: PartialEq<E>,
    {
        if self.entity != expected {
            self.path.container.fail(format!(
                "Expected {expected:?} at JSON path \"{}\" but was {:?}",
                self.path.path, self.entity
            ))
        }
        self
    }

    pub fn is_not_equal_to<E: fmt::Debug>(self, other: E) -> Self
    where
        T: PartialEq<E>,
    {
        if self.entity == other {
            self.path.container.fail(format!(
                "Expected a value other than {other:?} at JSON path \"{}\"",
                self.path.path
            ))
        }
        self
    }

    pub fn matches(self, predicate: impl FnOnce(&T) -> bool) -> Self {
        if !predicate(&self.entity) {
            self.path.container.fail(format!(
                "{:?} at JSON path \"{}\" does not match the predicate",
                self.entity, self.path.path
            ))
        }
        self
    }

    /// Runs `assertion` on the entity.
    pub fn satisfies(self, assertion: impl FnOnce(&T)) -> Self {
        self.path.container.check(|| assertion(&self.entity));
        self
    }

    pub fn get(self) -> T {
        self.entity
    }

    /// Switches to another path of the same response.
    pub fn path(&self, path: &str) -> PathSpec {
        self.path.path(path)
    }
}

/// Verifies a list converted from the response.
pub struct EntityListSpec<T> {
    entities: Vec<T>,
    path: PathSpec,
}

impl<T: fmt::Debug> EntityListSpec<T> {
    /// Every value of `values` is in the list.
    pub fn contains<E: fmt::Debug>(self, values: &[E]) -> Self
    where
        T: PartialEq<E>,
    {
        let missing: Vec<&E> = values
            .iter()
            .filter(|value| !self.entities.iter().any(|entity| entity == *value))
            .collect();
        if !missing.is_empty() {
            self.fail_with(format!("Expecting {missing:?} in"))
        }
        self
    }

    /// No value of `values` is in the list.
    pub fn does_not_contain<E: fmt::Debug>(self, values: &[E]) -> Self
    where
        T: PartialEq<E>,
    {
        let found: Vec<&E> = values
            .iter()
            .filter(|value| self.entities.iter().any(|entity| entity == *value))
            .collect();
        if !found.is_empty() {
            self.fail_with(format!("Not expecting {found:?} in"))
        }
        self
    }

    /// The list is exactly `values`, in the same order.
    pub fn contains_exactly<E: fmt::Debug>(self, values: &[E]) -> Self
    where
        T: PartialEq<E>,
    {
        let same = self.entities.len() == values.len()
            && self
                .entities
                .iter()
                .zip(values)
                .all(|(entity, value)| entity == value);
        if !same {
            self.fail_with(format!("Expecting exactly {values:?} in"))
        }
        self
    }

    pub fn has_size(self, size: usize) -> Self {
        if self.entities.len() != size {
            self.fail_with(format!("Expecting size {size} of"))
        }
        self
    }

    pub fn has_size_less_than(self, boundary: usize) -> Self {
        if self.entities.len() >= boundary {
            self.fail_with(format!("Expecting size less than {boundary} of"))
        }
        self
    }

    pub fn has_size_greater_than(self, boundary: usize) -> Self {
        if self.entities.len() <= boundary {
            self.fail_with(format!("Expecting size greater than {boundary} of"))
        }
        self
    }

    pub fn matches(self, predicate: impl FnOnce(&[T]) -> bool) -> Self {
        if !predicate(self.entities.as_slice()) {
            self.fail_with("Predicate not satisfied by".to_string())
        }
        self
    }

    /// Runs `assertion` on the list.
    pub fn satisfies(self, assertion: impl FnOnce(&[T])) -> Self {
        self.path.container.check(|| assertion(self.entities.as_slice()));
        self
    }

    pub fn get(self) -> Vec<T> {
        self.entities
    }

    /// Switches to another path of the same response.
    pub fn path(&self, path: &str) -> PathSpec {
        self.path.path(path)
    }

    fn fail_with(&self, expectation: String) -> ! {
        self.path.container.fail(format!(
            "{expectation} {:?} at JSON path \"{}\"",
            self.entities, self.path.path
        ))
    }
}
