//! 切点（Pointcut）表达式系统
//!
//! 表达式在注册切面时解析一次，之后只做结构匹配。支持的写法：
//!
//! ```text
//! execution(* shop..*Service.find*(..))
//! within(shop.service.*)
//! bean(order*)
//! services() && !execution(void *.internal*(..))
//! * OrderService.place(String, ..)
//! ```
//!
//! - `*` 在单个段内通配
//! - 类型路径中的 `..` 匹配任意数量的包段，参数列表中的 `..` 匹配任意参数
//! - 只有一段的类型模式匹配简单类型名
//! - 不带 `.` 的方法模式匹配任意声明类型
//! - `name()` 引用通过 [`AspectRegistry::define_pointcut`](crate::AspectRegistry::define_pointcut) 定义的命名切点

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use trellis_core::MethodSignature;

use crate::error::{AopError, AopResult};

/// 名称模式（`*` 通配）
#[derive(Clone)]
pub struct NamePattern {
    source: String,
    regex: Option<Regex>,
}

impl NamePattern {
    fn new(source: &str) -> Result<Self, String> {
        let source = source.trim();
        if source.is_empty() {
            return Err("empty name pattern".to_string());
        }
        if source.contains(['(', ')']) {
            return Err(format!("invalid name pattern '{}'", source));
        }
        if !source.contains('*') {
            return Ok(Self {
                source: source.to_string(),
                regex: None,
            });
        }

        let body = source
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body)).map_err(|e| e.to_string())?;
        Ok(Self {
            source: source.to_string(),
            regex: Some(regex),
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(text),
            None => self.source == text,
        }
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// 路径或参数列表中的一段
#[derive(Clone)]
enum Segment {
    /// `..`：任意数量（含零个）
    Any,
    Name(NamePattern),
}

fn match_segments(patterns: &[Segment], values: &[&str]) -> bool {
    match patterns.split_first() {
        None => values.is_empty(),
        Some((Segment::Any, rest)) => {
            (0..=values.len()).any(|skip| match_segments(rest, &values[skip..]))
        }
        Some((Segment::Name(pattern), rest)) => match values.split_first() {
            Some((value, tail)) => pattern.matches(value) && match_segments(rest, tail),
            None => false,
        },
    }
}

/// 类型模式，例如 `shop..*Service`
#[derive(Clone)]
pub struct TypePattern {
    source: String,
    segments: Vec<Segment>,
}

impl TypePattern {
    fn new(source: &str) -> Result<Self, String> {
        let source = source.trim();
        if source.is_empty() {
            return Err("empty type pattern".to_string());
        }

        let mut segments = Vec::new();
        for piece in source.split('.') {
            if piece.is_empty() {
                if !matches!(segments.last(), Some(Segment::Any)) {
                    segments.push(Segment::Any);
                }
            } else {
                segments.push(Segment::Name(NamePattern::new(piece)?));
            }
        }
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// 匹配点分形式的声明类型
    pub fn matches(&self, declaring_type: &str) -> bool {
        if let [Segment::Name(pattern)] = self.segments.as_slice() {
            let simple = declaring_type.rsplit('.').next().unwrap_or(declaring_type);
            return pattern.matches(simple);
        }
        let values: Vec<&str> = declaring_type.split('.').collect();
        match_segments(&self.segments, &values)
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// 方法签名模式：`<返回类型> [<类型路径>.]<方法名>(<参数>)`
#[derive(Clone)]
pub struct ExecutionPattern {
    source: String,
    return_type: NamePattern,
    declaring_type: Option<TypePattern>,
    method: NamePattern,
    params: Vec<Segment>,
}

impl ExecutionPattern {
    fn new(source: &str) -> Result<Self, String> {
        let source = source.trim();
        let open = source
            .find('(')
            .ok_or_else(|| "missing parameter list".to_string())?;
        if !source.ends_with(')') {
            return Err("parameter list must close the signature".to_string());
        }
        let head = source[..open].trim_end();
        let params = &source[open + 1..source.len() - 1];

        let (return_type, path) = head
            .rsplit_once(char::is_whitespace)
            .ok_or_else(|| "expected '<return-type> <method-pattern>'".to_string())?;
        let return_type = NamePattern::new(return_type)?;

        let (declaring_type, method) = match path.rsplit_once('.') {
            Some((type_path, method)) => (Some(TypePattern::new(type_path)?), method),
            None => (None, path),
        };

        Ok(Self {
            source: source.to_string(),
            return_type,
            declaring_type,
            method: NamePattern::new(method)?,
            params: Self::parse_params(params)?,
        })
    }

    fn parse_params(params: &str) -> Result<Vec<Segment>, String> {
        split_top_level(params)
            .into_iter()
            .map(|param| match param {
                ".." => Ok(Segment::Any),
                other => NamePattern::new(other).map(Segment::Name),
            })
            .collect()
    }

    pub fn matches(&self, method: &MethodSignature) -> bool {
        if !self.method.matches(&method.method_name) {
            return false;
        }
        if !self.return_type.matches(&method.return_type) {
            return false;
        }
        if let Some(declaring_type) = &self.declaring_type {
            if !declaring_type.matches(&method.declaring_type) {
                return false;
            }
        }
        let params: Vec<&str> = method.param_types.iter().map(String::as_str).collect();
        match_segments(&self.params, &params)
    }
}

impl fmt::Display for ExecutionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// 按逗号切分参数列表，忽略泛型尖括号内的逗号
fn split_top_level(params: &str) -> Vec<&str> {
    let params = params.trim();
    if params.is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, c) in params.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(params[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(params[start..].trim());
    parts
}

/// 切点表达式
#[derive(Clone)]
pub enum PointcutExpression {
    /// `execution(...)` 或不带关键字的方法签名
    Execution(ExecutionPattern),

    /// `within(type-pattern)`
    Within(TypePattern),

    /// `bean(name-pattern)`
    Bean(NamePattern),

    /// 与运算（AND）
    And(Box<PointcutExpression>, Box<PointcutExpression>),

    /// 或运算（OR）
    Or(Box<PointcutExpression>, Box<PointcutExpression>),

    /// 非运算（NOT）
    Not(Box<PointcutExpression>),
}

impl PointcutExpression {
    /// 检查 Bean 的某个方法是否匹配
    pub fn matches(&self, bean_name: &str, method: &MethodSignature) -> bool {
        match self {
            PointcutExpression::Execution(pattern) => pattern.matches(method),
            PointcutExpression::Within(pattern) => pattern.matches(&method.declaring_type),
            PointcutExpression::Bean(pattern) => pattern.matches(bean_name),
            PointcutExpression::And(left, right) => {
                left.matches(bean_name, method) && right.matches(bean_name, method)
            }
            PointcutExpression::Or(left, right) => {
                left.matches(bean_name, method) || right.matches(bean_name, method)
            }
            PointcutExpression::Not(expr) => !expr.matches(bean_name, method),
        }
    }

    /// 与运算
    pub fn and(self, other: PointcutExpression) -> Self {
        PointcutExpression::And(Box::new(self), Box::new(other))
    }

    /// 或运算
    pub fn or(self, other: PointcutExpression) -> Self {
        PointcutExpression::Or(Box::new(self), Box::new(other))
    }

    /// 非运算
    pub fn not(self) -> Self {
        PointcutExpression::Not(Box::new(self))
    }
}

impl fmt::Debug for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointcutExpression::Execution(p) => write!(f, "Execution({})", p),
            PointcutExpression::Within(p) => write!(f, "Within({})", p),
            PointcutExpression::Bean(p) => write!(f, "Bean({})", p),
            PointcutExpression::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            PointcutExpression::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            PointcutExpression::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

/// 已解析的切点
#[derive(Clone)]
pub struct Pointcut {
    expression: String,
    root: PointcutExpression,
}

impl Pointcut {
    /// 解析不含命名引用的表达式
    pub fn parse(expression: &str) -> AopResult<Self> {
        Self::parse_with(expression, &HashMap::new())
    }

    /// 解析表达式，`name()` 从 `named` 中查找
    pub fn parse_with(expression: &str, named: &HashMap<String, Pointcut>) -> AopResult<Self> {
        let root = Parser::new(expression, named).parse()?;
        Ok(Self {
            expression: expression.trim().to_string(),
            root,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn root(&self) -> &PointcutExpression {
        &self.root
    }

    /// 检查 Bean 的某个方法是否匹配
    pub fn matches(&self, bean_name: &str, method: &MethodSignature) -> bool {
        self.root.matches(bean_name, method)
    }
}

impl FromStr for Pointcut {
    type Err = AopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl fmt::Debug for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pointcut")
            .field("expression", &self.expression)
            .field("root", &self.root)
            .finish()
    }
}

/// 递归下降解析器
///
/// ```text
/// or      := and ('||' and)*
/// and     := unary ('&&' unary)*
/// unary   := '!' unary | primary
/// primary := '(' or ')' | designator '(' body ')' | name '()' | signature
/// ```
struct Parser<'a> {
    source: &'a str,
    pos: usize,
    named: &'a HashMap<String, Pointcut>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, named: &'a HashMap<String, Pointcut>) -> Self {
        Self {
            source,
            pos: 0,
            named,
        }
    }

    fn parse(mut self) -> AopResult<PointcutExpression> {
        let expr = self.parse_or()?;
        self.skip_whitespace();
        if self.pos < self.source.len() {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    fn error(&self, reason: impl fmt::Display) -> AopError {
        AopError::parse(self.source, format!("{} at offset {}", reason, self.pos))
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_whitespace();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> AopResult<PointcutExpression> {
        let mut left = self.parse_and()?;
        while self.eat("||") {
            let right = self.parse_and()?;
            left = left.or(right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> AopResult<PointcutExpression> {
        let mut left = self.parse_unary()?;
        while self.eat("&&") {
            let right = self.parse_unary()?;
            left = left.and(right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> AopResult<PointcutExpression> {
        if self.eat("!") {
            return Ok(self.parse_unary()?.not());
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> AopResult<PointcutExpression> {
        if self.eat("(") {
            let inner = self.parse_or()?;
            if !self.eat(")") {
                return Err(self.error("expected ')'"));
            }
            return Ok(inner);
        }

        let rest = self.rest();
        let word_len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let word = &rest[..word_len];

        if word.is_empty() || !rest[word_len..].starts_with('(') {
            return self.signature();
        }

        self.pos += word_len;
        let body = self.parenthesized()?;
        match word {
            "execution" => ExecutionPattern::new(body)
                .map(PointcutExpression::Execution)
                .map_err(|reason| self.error(reason)),
            "within" => TypePattern::new(body)
                .map(PointcutExpression::Within)
                .map_err(|reason| self.error(reason)),
            "bean" => NamePattern::new(body)
                .map(PointcutExpression::Bean)
                .map_err(|reason| self.error(reason)),
            name => {
                if !body.trim().is_empty() {
                    return Err(self.error(format!(
                        "named pointcut reference '{}()' takes no arguments",
                        name
                    )));
                }
                self.named
                    .get(name)
                    .map(|pointcut| pointcut.root.clone())
                    .ok_or_else(|| self.error(format!("undefined named pointcut '{}'", name)))
            }
        }
    }

    /// 读取 `(...)` 并返回括号内的文本
    fn parenthesized(&mut self) -> AopResult<&'a str> {
        let rest = self.rest();
        let mut depth = 0usize;
        for (idx, c) in rest.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += idx + 1;
                        return Ok(&rest[1..idx]);
                    }
                }
                _ => {}
            }
        }
        Err(self.error("unbalanced parentheses"))
    }

    /// 不带关键字的方法签名，读到顶层的 `&&`、`||` 或 `)` 为止
    fn signature(&mut self) -> AopResult<PointcutExpression> {
        self.skip_whitespace();
        let rest = self.rest();
        let mut depth = 0usize;
        let mut end = rest.len();
        for (idx, c) in rest.char_indices() {
            if depth == 0 && (rest[idx..].starts_with("&&") || rest[idx..].starts_with("||")) {
                end = idx;
                break;
            }
            match c {
                '(' => depth += 1,
                ')' if depth == 0 => {
                    end = idx;
                    break;
                }
                ')' => depth -= 1,
                _ => {}
            }
        }

        let text = rest[..end].trim();
        if text.is_empty() {
            return Err(self.error("expected a pointcut"));
        }
        let pattern = ExecutionPattern::new(text).map_err(|reason| self.error(reason))?;
        self.pos += end;
        Ok(PointcutExpression::Execution(pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place() -> MethodSignature {
        MethodSignature::new("shop.service.OrderService", "place")
            .with_params(["String", "u32"])
            .returns("u64")
    }

    fn find_all() -> MethodSignature {
        MethodSignature::new("shop.repo.jdbc.UserRepository", "findAll").returns("Vec<User>")
    }

    fn matches(expression: &str, bean: &str, method: &MethodSignature) -> bool {
        Pointcut::parse(expression).unwrap().matches(bean, method)
    }

    #[test]
    fn test_execution_with_full_path() {
        assert!(matches("execution(* shop.service.OrderService.place(..))", "orders", &place()));
        assert!(matches("execution(u64 shop.service.OrderService.place(..))", "orders", &place()));
        assert!(!matches("execution(void shop.service.OrderService.place(..))", "orders", &place()));
        assert!(!matches("execution(* shop.OrderService.place(..))", "orders", &place()));
    }

    #[test]
    fn test_double_dot_in_type_path() {
        assert!(matches("execution(* shop..*Repository.find*(..))", "users", &find_all()));
        assert!(matches("execution(* shop..*(..))", "users", &find_all()));
        assert!(!matches("execution(* shop..*Service.find*(..))", "users", &find_all()));
        assert!(!matches("execution(* billing..*(..))", "users", &find_all()));
    }

    #[test]
    fn test_single_segment_matches_simple_name() {
        assert!(matches("execution(* OrderService.*(..))", "orders", &place()));
        assert!(matches("execution(* *Service.place(..))", "orders", &place()));
        assert!(!matches("execution(* service.*(..))", "orders", &place()));
    }

    #[test]
    fn test_bare_method_pattern_matches_any_type() {
        assert!(matches("execution(* pla*(..))", "orders", &place()));
        assert!(matches("* place(..)", "orders", &place()));
        assert!(!matches("* find*(..)", "orders", &place()));
    }

    #[test]
    fn test_parameter_patterns() {
        assert!(matches("* place(String, u32)", "orders", &place()));
        assert!(matches("* place(String, ..)", "orders", &place()));
        assert!(matches("* place(*, *)", "orders", &place()));
        assert!(matches("* place(.., u32)", "orders", &place()));
        assert!(!matches("* place(String)", "orders", &place()));
        assert!(!matches("* place()", "orders", &place()));
        assert!(matches("* findAll()", "users", &find_all()));
    }

    #[test]
    fn test_generic_return_and_params() {
        let sig = MethodSignature::new("shop.Cache", "put")
            .with_params(["HashMap<String, u32>"])
            .returns("Result<(), Error>");
        assert!(matches("* put(HashMap<String, u32>)", "cache", &sig));
        assert!(matches("Result<*> put(*)", "cache", &sig));
    }

    #[test]
    fn test_within_and_bean() {
        assert!(matches("within(shop.service.*)", "orders", &place()));
        assert!(!matches("within(shop.*)", "orders", &place()));
        assert!(matches("within(shop..*)", "orders", &place()));
        assert!(matches("within(OrderService)", "orders", &place()));
        assert!(matches("bean(order*)", "orders", &place()));
        assert!(!matches("bean(user*)", "orders", &place()));
    }

    #[test]
    fn test_boolean_operators_and_grouping() {
        assert!(matches("bean(orders) && within(shop..*)", "orders", &place()));
        assert!(!matches("bean(orders) && !within(shop..*)", "orders", &place()));
        assert!(matches("bean(users) || * place(..)", "orders", &place()));
        assert!(matches("!(bean(users) || bean(carts)) && * *(..)", "orders", &place()));
        assert!(!matches("!(bean(orders) || bean(carts))", "orders", &place()));
    }

    #[test]
    fn test_named_references() {
        let mut named = HashMap::new();
        named.insert("services".to_string(), Pointcut::parse("within(shop..*Service)").unwrap());

        let pointcut = Pointcut::parse_with("services() && execution(* place(..))", &named).unwrap();
        assert!(pointcut.matches("orders", &place()));
        assert!(!pointcut.matches("users", &find_all()));

        let err = Pointcut::parse("services()").unwrap_err();
        assert!(matches!(err, AopError::PointcutParse { reason, .. } if reason.contains("services")));
    }

    #[test]
    fn test_nonexistent_method_matches_nothing() {
        assert!(!matches("execution(* shop.service.OrderService.cancel(..))", "orders", &place()));
    }

    #[test]
    fn test_parse_errors() {
        for bad in [
            "",
            "execution(* place(..)",
            "execution(place(..))",
            "within()",
            "bean(orders) &&",
            "&& bean(orders)",
            "(bean(orders)",
            "bean(orders))",
            "services(x)",
        ] {
            assert!(
                matches!(Pointcut::parse(bad), Err(AopError::PointcutParse { .. })),
                "expected parse error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_display_keeps_source() {
        let pointcut: Pointcut = " bean(orders) ".parse().unwrap();
        assert_eq!(pointcut.to_string(), "bean(orders)");
    }
}
