//! First-match dispatch over values and dynamic types.
//!
//! Cases run in the order they are declared and the first one that matches
//! wins. Once a case has fired, later cases are skipped even if they would
//! match more precisely, and `default` only runs when nothing matched.

use std::any::Any;

pub struct ValueSwitch<'a, T> {
    value: &'a T,
    handled: bool,
}

impl<'a, T: PartialEq> ValueSwitch<'a, T> {
    pub fn on(value: &'a T) -> Self {
        Self { value, handled: false }
    }

    pub fn case(self, expected: T, handler: impl FnOnce(&T)) -> Self {
        let matches = *self.value == expected;
        self.fire(matches, handler)
    }

    pub fn case_when(self, predicate: impl FnOnce(&T) -> bool, handler: impl FnOnce(&T)) -> Self {
        let matches = !self.handled && predicate(self.value);
        self.fire(matches, handler)
    }

    pub fn default(self, handler: impl FnOnce(&T)) {
        if !self.handled {
            handler(self.value);
        }
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }

    fn fire(mut self, matches: bool, handler: impl FnOnce(&T)) -> Self {
        if !self.handled && matches {
            handler(self.value);
            self.handled = true;
        }
        self
    }
}

pub struct TypeSwitch<'a> {
    value: &'a dyn Any,
    handled: bool,
}

impl<'a> TypeSwitch<'a> {
    pub fn on(value: &'a dyn Any) -> Self {
        Self { value, handled: false }
    }

    /// Fires if the value is exactly a `T`.
    pub fn case<T: Any>(mut self, handler: impl FnOnce(&T)) -> Self {
        if !self.handled {
            if let Some(value) = self.value.downcast_ref::<T>() {
                handler(value);
                self.handled = true;
            }
        }
        self
    }

    /// Fires if `predicate` accepts the value. Use this for families of types
    /// (for example "any error type"); declaration order still decides.
    pub fn case_when(mut self, predicate: impl FnOnce(&dyn Any) -> bool, handler: impl FnOnce(&dyn Any)) -> Self {
        if !self.handled && predicate(self.value) {
            handler(self.value);
            self.handled = true;
        }
        self
    }

    pub fn default(self, handler: impl FnOnce(&dyn Any)) {
        if !self.handled {
            handler(self.value);
        }
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, PartialEq)]
    enum Shape {
        Circle,
        Square,
        Triangle,
    }

    struct Cat;
    struct Dog;

    #[test]
    fn value_first_match_wins() {
        let fired = RefCell::new(Vec::new());
        ValueSwitch::on(&Shape::Square)
            .case(Shape::Circle, |_| fired.borrow_mut().push("circle"))
            .case(Shape::Square, |_| fired.borrow_mut().push("square"))
            .case_when(|_| true, |_| fired.borrow_mut().push("any"))
            .default(|_| fired.borrow_mut().push("default"));
        assert_eq!(fired.into_inner(), vec!["square"]);
    }

    #[test]
    fn value_default_when_unmatched() {
        let mut hit = None;
        ValueSwitch::on(&Shape::Triangle)
            .case(Shape::Circle, |_| panic!("circle"))
            .default(|shape| hit = Some(format!("{:?}", shape)));
        assert_eq!(hit.as_deref(), Some("Triangle"));
    }

    #[test]
    fn type_case_downcasts() {
        let mut name = "";
        let animal: Box<dyn Any> = Box::new(Dog);
        let switch = TypeSwitch::on(animal.as_ref())
            .case::<Cat>(|_| name = "cat")
            .case::<Dog>(|_| name = "dog");
        assert!(switch.is_handled());
        assert_eq!(name, "dog");
    }

    #[test]
    fn broad_case_declared_first_shadows_exact_case() {
        let fired = RefCell::new(Vec::new());
        let value: &dyn Any = &42_i32;
        TypeSwitch::on(value)
            .case_when(
                |v| v.is::<i32>() || v.is::<i64>(),
                |_| fired.borrow_mut().push("integer"),
            )
            .case::<i32>(|_| fired.borrow_mut().push("i32"))
            .default(|_| fired.borrow_mut().push("default"));
        assert_eq!(fired.into_inner(), vec!["integer"]);
    }

    #[test]
    fn type_default_when_unmatched() {
        let mut defaulted = false;
        TypeSwitch::on(&"text")
            .case::<String>(|_| panic!("not a String"))
            .default(|v| defaulted = v.is::<&str>());
        assert!(defaulted);
    }
}
