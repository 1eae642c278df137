use quote::ToTokens;
use std::collections::HashSet;
use syn::punctuated::Punctuated;
use syn::{Attribute, Path, Token};

/// 宏要求目标类型具备的派生集合
///
/// 应用时把目标上所有 `#[derive(..)]` 合并为一个并置于最前：宏要求的派生在前，
/// 用户自己写的在后，按末段名去重（`Serialize` 与 `serde::Serialize` 视为同一个）。
pub(crate) struct DeriveSet {
    required: Vec<Path>,
}

impl DeriveSet {
    pub(crate) fn new() -> Self {
        Self {
            required: Vec::new(),
        }
    }

    pub(crate) fn with(mut self, path: Path) -> Self {
        self.required.push(path);
        self
    }

    pub(crate) fn with_if(self, enabled: bool, path: Path) -> Self {
        if enabled { self.with(path) } else { self }
    }

    /// 行存储与事件载荷都经 serde_json 往返
    pub(crate) fn with_serde(self) -> Self {
        self.with(syn::parse_quote!(serde::Serialize))
            .with(syn::parse_quote!(serde::Deserialize))
    }

    pub(crate) fn apply(self, attrs: &mut Vec<Attribute>) -> syn::Result<()> {
        let mut derives = self.required;
        let mut retained = Vec::with_capacity(attrs.len());

        for attr in attrs.drain(..) {
            if attr.path().is_ident("derive") {
                let listed =
                    attr.parse_args_with(Punctuated::<Path, Token![,]>::parse_terminated)?;
                derives.extend(listed);
            } else {
                retained.push(attr);
            }
        }

        let mut seen = HashSet::new();
        derives.retain(|path| seen.insert(derive_key(path)));

        attrs.push(syn::parse_quote!(#[derive(#(#derives),*)]));
        attrs.extend(retained);
        Ok(())
    }
}

fn derive_key(path: &Path) -> String {
    match path.segments.last() {
        Some(last) => last.ident.to_string(),
        None => path.to_token_stream().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derive_keys(attr: &Attribute) -> Vec<String> {
        attr.parse_args_with(Punctuated::<Path, Token![,]>::parse_terminated)
            .unwrap()
            .iter()
            .map(derive_key)
            .collect()
    }

    #[test]
    fn required_derives_come_first_and_user_paths_are_deduplicated() {
        let mut item: syn::ItemStruct = syn::parse_quote! {
            #[derive(Serialize, Hash)]
            #[serde(rename_all = "camelCase")]
            #[derive(std::fmt::Debug)]
            struct Sample { value: u8 }
        };

        DeriveSet::new()
            .with(syn::parse_quote!(Debug))
            .with(syn::parse_quote!(Clone))
            .with_serde()
            .apply(&mut item.attrs)
            .unwrap();

        assert_eq!(item.attrs.len(), 2);
        assert_eq!(
            derive_keys(&item.attrs[0]),
            ["Debug", "Clone", "Serialize", "Deserialize", "Hash"]
        );
        assert!(item.attrs[1].path().is_ident("serde"));
    }

    #[test]
    fn disabled_derives_are_left_to_the_user() {
        let mut item: syn::ItemStruct = syn::parse_quote! {
            struct Sample { value: u8 }
        };

        DeriveSet::new()
            .with_if(false, syn::parse_quote!(Debug))
            .with(syn::parse_quote!(Clone))
            .apply(&mut item.attrs)
            .unwrap();

        assert_eq!(derive_keys(&item.attrs[0]), ["Clone"]);
    }

    #[test]
    fn malformed_derive_is_reported() {
        let mut attrs: Vec<Attribute> = vec![syn::parse_quote!(#[derive = "Debug"])];
        assert!(DeriveSet::new().apply(&mut attrs).is_err());
    }
}
