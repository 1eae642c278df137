use syn::{Field, FieldsNamed, Token, punctuated::Punctuated};

/// 注入字段的摆放位置
#[derive(Clone, Copy)]
pub(crate) enum Placement {
    /// 放在最前；已存在的同名字段也会被移到最前（沿用用户的定义）
    Front,
    /// 缺失时追加到末尾；已存在则保持原位
    Back,
}

fn field_name_is(field: &Field, name: &str) -> bool {
    field.ident.as_ref().map(|i| i == name).unwrap_or(false)
}

fn name_of(field: &Field) -> String {
    field
        .ident
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default()
}

/// 确保具名字段结构体包含所需字段
/// - required: 完整的字段定义（可带属性），按给定顺序处理
/// - placement: 见 `Placement`
pub(crate) fn ensure_required_fields(
    fields_named: &mut FieldsNamed,
    required: &[Field],
    placement: Placement,
) {
    let old_named = fields_named.named.clone();
    let mut new_named: Punctuated<Field, Token![,]> = Punctuated::new();

    match placement {
        Placement::Front => {
            for req in required {
                let name = name_of(req);
                match old_named.iter().find(|f| field_name_is(f, &name)) {
                    Some(existing) => new_named.push(existing.clone()),
                    None => new_named.push(req.clone()),
                }
            }

            // 其余字段保持原始顺序
            for f in old_named {
                if !required.iter().any(|req| field_name_is(&f, &name_of(req))) {
                    new_named.push(f);
                }
            }
        }
        Placement::Back => {
            for f in old_named.iter() {
                new_named.push(f.clone());
            }
            for req in required {
                let name = name_of(req);
                if !old_named.iter().any(|f| field_name_is(f, &name)) {
                    new_named.push(req.clone());
                }
            }
        }
    }

    fields_named.named = new_named;
}

/// 结构体名转为 snake_case（实体类型名的默认值）
pub(crate) fn to_snake_case(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    for (i, ch) in ident.char_indices() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_names() {
        assert_eq!(to_snake_case("Order"), "order");
        assert_eq!(to_snake_case("SalesOrderLine"), "sales_order_line");
    }

    #[test]
    fn front_reuses_user_definition_and_back_appends() {
        let mut fields: FieldsNamed = syn::parse_quote!({ name: String, id: u8 });
        let id: Field = syn::parse_quote!(id: Uuid);
        let audit: Field = syn::parse_quote!(audit: AuditFields);

        ensure_required_fields(&mut fields, &[id], Placement::Front);
        ensure_required_fields(&mut fields, &[audit], Placement::Back);

        let names: Vec<String> = fields.named.iter().map(name_of).collect();
        assert_eq!(names, ["id", "name", "audit"]);
    }
}
